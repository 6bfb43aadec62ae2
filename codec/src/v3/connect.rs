// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use crate::binary_data::BinaryData;
use crate::connect_flags::ConnectFlags;
use crate::string_data::StringData;
use crate::topic::PubTopic;
use crate::utils::validate_client_id;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, ProtocolLevel, QoS, U16Data, VarIntError,
};

/// Protocol name of MQTT 3.1.1 and 5.0.
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol name of the old 3.1 revision.
pub const PROTOCOL_NAME_V31: &str = "MQIsdp";

/// `ConnectPacket` is the first packet a client sends to the broker after
/// the network connection is established.
///
/// Structure:
///
/// ```txt
/// +--------------------------+
/// | Fixed header             |
/// +--------------------------+
/// | Protocol name            |
/// +--------------------------+
/// | Protocol level           |
/// +--------------------------+
/// | Connect flags            |
/// +--------------------------+
/// | Keep alive               |
/// +--------------------------+
/// | Client id                |
/// +--------------------------+
/// | Will topic (optional)    |
/// +--------------------------+
/// | Will message (optional)  |
/// +--------------------------+
/// | Username (optional)      |
/// +--------------------------+
/// | Password (optional)      |
/// +--------------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    protocol_name: StringData,
    protocol_level: ProtocolLevel,
    connect_flags: ConnectFlags,

    /// Maximum interval in seconds between two client packets. Zero
    /// disables the keep alive mechanism.
    keep_alive: U16Data,

    client_id: StringData,
    will_topic: Option<PubTopic>,
    will_message: BinaryData,
    username: StringData,
    password: BinaryData,
}

impl Default for ConnectPacket {
    fn default() -> Self {
        Self {
            protocol_name: StringData::from(PROTOCOL_NAME).expect("valid literal"),
            protocol_level: ProtocolLevel::V311,
            connect_flags: ConnectFlags::default(),
            keep_alive: U16Data::new(60),
            client_id: StringData::new(),
            will_topic: None,
            will_message: BinaryData::new(),
            username: StringData::new(),
            password: BinaryData::new(),
        }
    }
}

impl ConnectPacket {
    /// Create a connect packet with `client_id`.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        validate_client_id(client_id).map_err(|_| EncodeError::InvalidClientId)?;
        let mut packet = Self::default();
        packet.client_id = StringData::from(client_id)?;
        Ok(packet)
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    #[must_use]
    pub const fn connect_flags(&self) -> &ConnectFlags {
        &self.connect_flags
    }

    pub fn connect_flags_mut(&mut self) -> &mut ConnectFlags {
        &mut self.connect_flags
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive.value()
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = U16Data::new(keep_alive);
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    /// Replace the client id.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn set_client_id(&mut self, client_id: &str) -> Result<&mut Self, EncodeError> {
        validate_client_id(client_id).map_err(|_| EncodeError::InvalidClientId)?;
        self.client_id = StringData::from(client_id)?;
        Ok(self)
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&PubTopic> {
        self.will_topic.as_ref()
    }

    /// Set will topic and message.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid or `message` is too long.
    pub fn set_will(&mut self, topic: &str, message: &[u8]) -> Result<&mut Self, EncodeError> {
        self.will_topic = Some(PubTopic::new(topic)?);
        self.will_message = BinaryData::from_slice(message)?;
        self.connect_flags.set_will(true);
        Ok(self)
    }

    #[must_use]
    pub fn will_message(&self) -> &[u8] {
        self.will_message.as_slice()
    }

    #[must_use]
    pub const fn will_qos(&self) -> QoS {
        self.connect_flags.will_qos()
    }

    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_ref()
    }

    /// Set the username field.
    ///
    /// # Errors
    ///
    /// Returns error if `username` is not a valid packet string.
    pub fn set_username(&mut self, username: &str) -> Result<&mut Self, EncodeError> {
        self.username = StringData::from(username)?;
        self.connect_flags.set_username(!username.is_empty());
        Ok(self)
    }

    #[must_use]
    pub fn password(&self) -> &[u8] {
        self.password.as_slice()
    }

    /// Set the password field.
    ///
    /// # Errors
    ///
    /// Returns error if `password` is too long.
    pub fn set_password(&mut self, password: &[u8]) -> Result<&mut Self, EncodeError> {
        self.password = BinaryData::from_slice(password)?;
        self.connect_flags.set_password(!password.is_empty());
        Ok(self)
    }

    fn remaining_length(&self) -> usize {
        let mut len = self.protocol_name.bytes()
            + ProtocolLevel::bytes()
            + ConnectFlags::bytes()
            + U16Data::bytes()
            + self.client_id.bytes();
        if self.connect_flags.will() {
            if let Some(will_topic) = &self.will_topic {
                len += will_topic.bytes();
            }
            len += self.will_message.bytes();
        }
        if self.connect_flags.username() {
            len += self.username.bytes();
        }
        if self.connect_flags.password() {
            len += self.password.bytes();
        }
        len
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = StringData::decode(ba)?;
        if protocol_name.as_ref() != PROTOCOL_NAME && protocol_name.as_ref() != PROTOCOL_NAME_V31 {
            return Err(DecodeError::InvalidProtocolName);
        }

        let protocol_level = ProtocolLevel::decode(ba)?;
        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = U16Data::decode(ba)?;

        let client_id = StringData::decode(ba)?;
        if !client_id.is_empty() {
            validate_client_id(client_id.as_ref()).map_err(|_| DecodeError::InvalidClientId)?;
        }

        // If the Client supplies a zero-byte ClientId, the Client MUST also
        // set CleanSession to 1 [MQTT-3.1.3-7].
        if client_id.is_empty() && !connect_flags.clean_session() {
            return Err(DecodeError::InvalidClientId);
        }

        let (will_topic, will_message) = if connect_flags.will() {
            let topic = PubTopic::decode(ba)?;
            let message = BinaryData::decode(ba)?;
            (Some(topic), message)
        } else {
            (None, BinaryData::new())
        };

        let username = if connect_flags.username() {
            StringData::decode(ba)?
        } else {
            StringData::new()
        };
        let password = if connect_flags.password() {
            BinaryData::decode(ba)?
        } else {
            BinaryData::new()
        };

        Ok(Self {
            protocol_name,
            protocol_level,
            connect_flags,
            keep_alive,
            client_id,
            will_topic,
            will_message,
            username,
            password,
        })
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(PacketType::Connect, self.remaining_length())?;
        fixed_header.encode(buf)?;

        self.protocol_name.encode(buf)?;
        self.protocol_level.encode(buf)?;
        self.connect_flags.encode(buf)?;
        self.keep_alive.encode(buf)?;

        self.client_id.encode(buf)?;
        if self.connect_flags.will() {
            if let Some(will_topic) = &self.will_topic {
                will_topic.encode(buf)?;
            }
            self.will_message.encode(buf)?;
        }
        if self.connect_flags.username() {
            self.username.encode(buf)?;
        }
        if self.connect_flags.password() {
            self.password.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::Connect, self.remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut packet = ConnectPacket::new("sensor-17").unwrap();
        packet.set_keep_alive(30);
        packet.set_username("alice").unwrap();
        packet.set_password(b"secret").unwrap();
        packet.set_will("alarm/offline", b"gone").unwrap();

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.client_id(), "sensor-17");
        assert_eq!(decoded.keep_alive(), 30);
        assert!(decoded.connect_flags().will());
    }

    #[test]
    fn test_empty_client_id_requires_clean_session() {
        let mut packet = ConnectPacket::default();
        packet.connect_flags_mut().set_clean_session(false);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba),
            Err(DecodeError::InvalidClientId)
        );
    }
}
