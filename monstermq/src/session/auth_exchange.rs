// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Enhanced (SASL style) authentication exchange.
//!
//! One state object lives on the endpoint per in-progress exchange; it is
//! driven by the connect packet and any following AUTH packets, and torn
//! down on CONNACK or DISCONNECT.

/// Built-in mechanism: single-step SASL PLAIN.
pub const METHOD_PLAIN: &str = "PLAIN";

/// Outcome of one exchange step.
#[derive(Debug, PartialEq, Eq)]
pub enum ExchangeStep {
    /// Credentials extracted; finish connect processing with them.
    Done {
        username: String,
        password: Vec<u8>,
    },

    /// Send an AUTH packet with reason continue-authentication and this
    /// challenge, then wait for the client's next AUTH packet.
    Continue(Vec<u8>),

    /// Malformed exchange data; reject with bad-authentication-method.
    Failed,
}

/// State of one enhanced authentication exchange.
#[derive(Debug)]
pub struct AuthExchange {
    method: String,
}

impl AuthExchange {
    /// Start an exchange for `method`, or `None` for an unsupported
    /// mechanism (rejected with CONNACK 0x8C).
    #[must_use]
    pub fn start(method: &str) -> Option<Self> {
        match method {
            METHOD_PLAIN => Some(Self {
                method: method.to_string(),
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Feed authentication data from the connect or an AUTH packet.
    #[must_use]
    pub fn step(&mut self, data: &[u8]) -> ExchangeStep {
        match self.method.as_str() {
            METHOD_PLAIN => Self::step_plain(data),
            _ => ExchangeStep::Failed,
        }
    }

    /// PLAIN: `[authzid] NUL authcid NUL passwd` (RFC 4616).
    fn step_plain(data: &[u8]) -> ExchangeStep {
        let mut parts = data.splitn(3, |byte| *byte == 0);
        let _authzid = parts.next();
        let (Some(authcid), Some(passwd)) = (parts.next(), parts.next()) else {
            return ExchangeStep::Failed;
        };
        let Ok(username) = String::from_utf8(authcid.to_vec()) else {
            return ExchangeStep::Failed;
        };
        if username.is_empty() {
            return ExchangeStep::Failed;
        }
        ExchangeStep::Done {
            username,
            password: passwd.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_exchange() {
        let mut exchange = AuthExchange::start(METHOD_PLAIN).unwrap();
        assert_eq!(
            exchange.step(b"\0alice\0secret"),
            ExchangeStep::Done {
                username: "alice".to_string(),
                password: b"secret".to_vec(),
            }
        );
    }

    #[test]
    fn test_plain_with_authzid() {
        let mut exchange = AuthExchange::start(METHOD_PLAIN).unwrap();
        assert_eq!(
            exchange.step(b"admin\0alice\0secret"),
            ExchangeStep::Done {
                username: "alice".to_string(),
                password: b"secret".to_vec(),
            }
        );
    }

    #[test]
    fn test_malformed_data_fails() {
        let mut exchange = AuthExchange::start(METHOD_PLAIN).unwrap();
        assert_eq!(exchange.step(b"no-separators"), ExchangeStep::Failed);
        assert_eq!(exchange.step(b"\0\0pw"), ExchangeStep::Failed);
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(AuthExchange::start("SCRAM-SHA-256").is_none());
    }
}
