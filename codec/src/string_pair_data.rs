// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use crate::string_data::StringData;
use crate::utils::StringError;
use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// A UTF-8 string pair, used for user properties.
///
/// Both strings carry their own two byte length prefix. The same name is
/// allowed to appear more than once in a property list, and the order of
/// pairs is significant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringPairData {
    key: StringData,
    value: StringData,
}

impl StringPairData {
    /// Create a new string pair.
    ///
    /// # Errors
    ///
    /// Returns error if `key` or `value` is not a valid packet string.
    pub fn from(key: &str, value: &str) -> Result<Self, StringError> {
        Ok(Self {
            key: StringData::from(key)?,
            value: StringData::from(value)?,
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        self.key.as_ref()
    }

    #[must_use]
    pub fn value(&self) -> &str {
        self.value.as_ref()
    }

    /// Byte length in packet.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.key.bytes() + self.value.bytes()
    }
}

impl DecodePacket for StringPairData {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let key = StringData::decode(ba)?;
        let value = StringData::decode(ba)?;
        Ok(Self { key, value })
    }
}

impl EncodePacket for StringPairData {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        self.key.encode(buf)?;
        self.value.encode(buf)?;
        Ok(self.bytes())
    }
}
