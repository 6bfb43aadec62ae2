// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Errors of UTF-8 string fields in packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// Longer than 65535 bytes.
    TooManyData,

    /// Contains forbidden code points, like U+0000.
    InvalidChar,

    /// Byte sequence is not well formed UTF-8.
    NonUtf8,
}

/// Maximum byte length of string data in packets.
pub const STRING_MAX_BYTES: usize = u16::MAX as usize;

/// Check that `s` may be used as string data in a packet.
///
/// The character data in a UTF-8 Encoded String MUST be well-formed UTF-8
/// as defined by the Unicode specification and restated in RFC 3629.
/// A UTF-8 Encoded String MUST NOT include an encoding of the null
/// character U+0000 [MQTT-1.5.4-2].
///
/// # Errors
///
/// Returns error if `s` is too long or contains a null character.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > STRING_MAX_BYTES {
        return Err(StringError::TooManyData);
    }
    if s.chars().any(|c| c == '\u{0000}') {
        return Err(StringError::InvalidChar);
    }
    Ok(())
}

/// Convert raw bytes into an owned string, validating packet string rules.
///
/// # Errors
///
/// Returns error if `bytes` is not a valid UTF-8 string.
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = String::from_utf8(bytes.to_vec()).map_err(|_| StringError::NonUtf8)?;
    validate_utf8_string(&s)?;
    Ok(s)
}

/// Generate a random alphanumeric string with `len` characters.
#[must_use]
pub fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Prefix of server generated client ids.
pub const ASSIGNED_CLIENT_ID_PREFIX: &str = "auto-";

/// Generate a unique client id on behalf of a client which sent an empty one.
#[must_use]
pub fn random_client_id() -> String {
    format!("{}{}", ASSIGNED_CLIENT_ID_PREFIX, random_string(16))
}

/// Errors of client id values in connect packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    IsEmpty,

    /// Longer than 23 characters.
    TooLong,

    /// May only contain `0-9`, `a-z`, `A-Z`, `-` and `_`.
    InvalidChars,
}

/// Maximum character length of a client id the broker accepts.
///
/// The Server MUST allow ClientIds which are between 1 and 23 UTF-8 encoded
/// bytes in length, and that contain only the characters
/// "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ"
/// [MQTT-3.1.3-5].
pub const CLIENT_ID_MAX_LEN: usize = 23;

/// Check client id requirements.
///
/// # Errors
///
/// Returns error if `client_id` is empty, too long or contains unexpected
/// characters.
pub fn validate_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.is_empty() {
        return Err(ClientIdError::IsEmpty);
    }
    if client_id.len() > CLIENT_ID_MAX_LEN {
        return Err(ClientIdError::TooLong);
    }
    if client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(ClientIdError::InvalidChars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_utf8_string() {
        assert!(validate_utf8_string("sensors/one").is_ok());
        assert!(validate_utf8_string("with\u{0000}null").is_err());
    }

    #[test]
    fn test_random_client_id() {
        let id = random_client_id();
        assert!(id.starts_with(ASSIGNED_CLIENT_ID_PREFIX));
        assert!(validate_client_id(&id).is_ok());
    }

    #[test]
    fn test_validate_client_id() {
        assert!(validate_client_id("pub-1").is_ok());
        assert_eq!(validate_client_id(""), Err(ClientIdError::IsEmpty));
        assert_eq!(
            validate_client_id("0123456789012345678901234"),
            Err(ClientIdError::TooLong)
        );
        assert_eq!(
            validate_client_id("space inside"),
            Err(ClientIdError::InvalidChars)
        );
    }
}
