// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use super::property::check_property_type_list;
use super::{Properties, PropertyType};
use crate::binary_data::BinaryData;
use crate::connect_flags::ConnectFlags;
use crate::string_data::StringData;
use crate::topic::PubTopic;
use crate::utils::validate_client_id;
use crate::v3::PROTOCOL_NAME;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, ProtocolLevel, QoS, U16Data, VarIntError,
};

/// Properties allowed in the connect packet variable header.
pub const CONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumPacketSize,
    PropertyType::TopicAliasMaximum,
    PropertyType::RequestResponseInformation,
    PropertyType::RequestProblemInformation,
    PropertyType::UserProperty,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// Properties allowed in the will property block of the payload.
pub const WILL_PROPERTIES: &[PropertyType] = &[
    PropertyType::WillDelayInterval,
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::ContentType,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
];

/// First packet of an MQTT 5.0 connection.
///
/// Compared to 3.1.1 it adds a property block in the variable header and a
/// will property block in front of the will topic.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    protocol_name: StringData,
    connect_flags: ConnectFlags,
    keep_alive: U16Data,
    properties: Properties,

    client_id: StringData,
    will_properties: Properties,
    will_topic: Option<PubTopic>,
    will_message: BinaryData,
    username: StringData,
    password: BinaryData,
}

impl Default for ConnectPacket {
    fn default() -> Self {
        Self {
            protocol_name: StringData::from(PROTOCOL_NAME).expect("valid literal"),
            connect_flags: ConnectFlags::default(),
            keep_alive: U16Data::new(60),
            properties: Properties::new(),
            client_id: StringData::new(),
            will_properties: Properties::new(),
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
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
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
    pub const fn will_properties(&self) -> &Properties {
        &self.will_properties
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&PubTopic> {
        self.will_topic.as_ref()
    }

    /// Set will topic, message and properties.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid or `message` is too long.
    pub fn set_will(
        &mut self,
        topic: &str,
        message: &[u8],
        properties: Properties,
    ) -> Result<&mut Self, EncodeError> {
        self.will_topic = Some(PubTopic::new(topic)?);
        self.will_message = BinaryData::from_slice(message)?;
        self.will_properties = properties;
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
            + self.properties.bytes()
            + self.client_id.bytes();
        if self.connect_flags.will() {
            len += self.will_properties.bytes();
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
        if protocol_name.as_ref() != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }
        let protocol_level = ProtocolLevel::decode(ba)?;
        if protocol_level != ProtocolLevel::V5 {
            return Err(DecodeError::InvalidProtocolLevel);
        }

        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = U16Data::decode(ba)?;

        let properties = Properties::decode(ba)?;
        if let Err(property_type) = check_property_type_list(properties.props(), CONNECT_PROPERTIES)
        {
            log::error!("v5/ConnectPacket: invalid property type {property_type:?}");
            return Err(DecodeError::InvalidPropertyType);
        }

        let client_id = StringData::decode(ba)?;
        if !client_id.is_empty() {
            validate_client_id(client_id.as_ref()).map_err(|_| DecodeError::InvalidClientId)?;
        }

        let (will_properties, will_topic, will_message) = if connect_flags.will() {
            let will_properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(will_properties.props(), WILL_PROPERTIES)
            {
                log::error!("v5/ConnectPacket: invalid will property type {property_type:?}");
                return Err(DecodeError::InvalidPropertyType);
            }
            let topic = PubTopic::decode(ba)?;
            let message = BinaryData::decode(ba)?;
            (will_properties, Some(topic), message)
        } else {
            (Properties::new(), None, BinaryData::new())
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
            connect_flags,
            keep_alive,
            properties,
            client_id,
            will_properties,
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
        ProtocolLevel::V5.encode(buf)?;
        self.connect_flags.encode(buf)?;
        self.keep_alive.encode(buf)?;
        self.properties.encode(buf)?;

        self.client_id.encode(buf)?;
        if self.connect_flags.will() {
            self.will_properties.encode(buf)?;
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
    use crate::v5::Property;
    use crate::U32Data;

    #[test]
    fn test_round_trip_with_properties() {
        let mut packet = ConnectPacket::new("client-5").unwrap();
        packet
            .properties_mut()
            .push(Property::SessionExpiryInterval(U32Data::new(3600)))
            .push(Property::ReceiveMaximum(U16Data::new(20)))
            .push(Property::TopicAliasMaximum(U16Data::new(10)));
        packet.set_username("bob").unwrap();
        packet.set_password(b"pw").unwrap();

        let mut will_properties = Properties::new();
        will_properties.push(Property::WillDelayInterval(U32Data::new(5)));
        packet
            .set_will("state/client-5", b"offline", will_properties)
            .unwrap();

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.properties().session_expiry_interval(), Some(3600));
        assert_eq!(decoded.properties().receive_maximum(), Some(20));
        assert_eq!(decoded.will_properties().will_delay_interval(), Some(5));
    }

    #[test]
    fn test_invalid_property_rejected() {
        // TopicAlias is not allowed in connect packets.
        let mut packet = ConnectPacket::new("client-6").unwrap();
        packet
            .properties_mut()
            .push(Property::TopicAlias(U16Data::new(3)));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba),
            Err(DecodeError::InvalidPropertyType)
        );
    }
}
