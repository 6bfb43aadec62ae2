// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! MQTT 5.0 properties.
//!
//! The last field in the variable header of CONNECT, CONNACK, PUBLISH,
//! PUBACK, PUBREC, PUBREL, PUBCOMP, SUBSCRIBE, SUBACK, UNSUBSCRIBE,
//! UNSUBACK, DISCONNECT and AUTH packets is a set of properties, prefixed
//! by its byte length as a variable byte integer.

use std::convert::TryFrom;

use crate::binary_data::BinaryData;
use crate::bool_data::BoolData;
use crate::string_data::StringData;
use crate::string_pair_data::StringPairData;
use crate::topic::PubTopic;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, QoS, U16Data, U32Data, VarInt,
};

/// Property identifiers.
#[allow(clippy::module_name_repetitions)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    /// Byte length of the identifier in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// Properties which may legally occur more than once in a property list.
pub const MULTIPLE_PROPERTIES: &[PropertyType] = &[
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
];

/// Check that every property in `properties` is allowed for the packet,
/// and that non repeatable properties occur at most once.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_property_type_list(
    properties: &[Property],
    allowed: &[PropertyType],
) -> Result<(), PropertyType> {
    for property in properties {
        if !allowed.contains(&property.property_type()) {
            return Err(property.property_type());
        }
    }

    for property_type in allowed {
        if MULTIPLE_PROPERTIES.contains(property_type) {
            continue;
        }
        let count = properties
            .iter()
            .filter(|p| p.property_type() == *property_type)
            .count();
        if count > 1 {
            return Err(*property_type);
        }
    }

    Ok(())
}

/// A single property value.
///
/// The payload format indicator tells whether the payload is unspecified
/// bytes (0) or UTF-8 character data (1). The message expiry interval is
/// the lifetime of the message in seconds. The remaining variants follow
/// the MQTT 5.0 specification section 2.2.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// Byte, PUBLISH and will properties.
    PayloadFormatIndicator(BoolData),

    /// Four byte integer, PUBLISH and will properties.
    MessageExpiryInterval(U32Data),

    /// UTF-8 string, PUBLISH and will properties.
    ContentType(StringData),

    /// Topic used as the reply address of a request message.
    ResponseTopic(PubTopic),

    /// Binary data echoed into the response message.
    CorrelationData(BinaryData),

    /// Variable byte integer in 1..=268435455, PUBLISH and SUBSCRIBE.
    SubscriptionIdentifier(VarInt),

    /// Four byte integer, CONNECT, CONNACK and DISCONNECT. Zero means the
    /// session ends when the network connection closes; 0xFFFFFFFF means
    /// the session never expires.
    SessionExpiryInterval(U32Data),

    /// CONNACK; the client id the server generated for a zero length one.
    AssignedClientIdentifier(StringData),

    /// CONNACK; overrides the keep alive the client requested.
    ServerKeepAlive(U16Data),

    /// CONNECT, CONNACK, AUTH; name of the extended authentication method.
    AuthenticationMethod(StringData),

    /// CONNECT, CONNACK, AUTH; data of the extended authentication
    /// exchange.
    AuthenticationData(BinaryData),

    /// Byte, CONNECT.
    RequestProblemInformation(BoolData),

    /// Four byte integer, will properties; seconds to wait before the
    /// will message is published.
    WillDelayInterval(U32Data),

    /// Byte, CONNECT.
    RequestResponseInformation(BoolData),

    /// UTF-8 string, CONNACK.
    ResponseInformation(StringData),

    /// UTF-8 string, CONNACK and DISCONNECT.
    ServerReference(StringData),

    /// UTF-8 string, any ACK packet.
    ReasonString(StringData),

    /// Two byte integer in 1..=65535, CONNECT and CONNACK; limit of
    /// concurrent QoS > 0 deliveries.
    ReceiveMaximum(U16Data),

    /// Two byte integer, CONNECT and CONNACK; highest topic alias the
    /// sender of this packet accepts.
    TopicAliasMaximum(U16Data),

    /// Two byte integer in 1..=topic-alias-maximum, PUBLISH.
    TopicAlias(U16Data),

    /// Byte 0 or 1, CONNACK.
    MaximumQoS(QoS),

    /// Byte, CONNACK.
    RetainAvailable(BoolData),

    /// UTF-8 string pair, any packet. Order and duplicates are
    /// significant.
    UserProperty(StringPairData),

    /// Four byte integer in 1..=268435455, CONNECT and CONNACK.
    MaximumPacketSize(U32Data),

    /// Byte, CONNACK.
    WildcardSubscriptionAvailable(BoolData),

    /// Byte, CONNACK.
    SubscriptionIdentifierAvailable(BoolData),

    /// Byte, CONNACK.
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Byte length in packet, including the identifier byte.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = match self {
            Self::PayloadFormatIndicator(_)
            | Self::RequestProblemInformation(_)
            | Self::RequestResponseInformation(_)
            | Self::MaximumQoS(_)
            | Self::RetainAvailable(_)
            | Self::WildcardSubscriptionAvailable(_)
            | Self::SubscriptionIdentifierAvailable(_)
            | Self::SharedSubscriptionAvailable(_) => BoolData::bytes(),

            Self::ServerKeepAlive(_)
            | Self::ReceiveMaximum(_)
            | Self::TopicAliasMaximum(_)
            | Self::TopicAlias(_) => U16Data::bytes(),

            Self::MessageExpiryInterval(_)
            | Self::SessionExpiryInterval(_)
            | Self::WillDelayInterval(_)
            | Self::MaximumPacketSize(_) => U32Data::bytes(),

            Self::SubscriptionIdentifier(v) => v.bytes(),

            Self::ContentType(v)
            | Self::AssignedClientIdentifier(v)
            | Self::AuthenticationMethod(v)
            | Self::ResponseInformation(v)
            | Self::ServerReference(v)
            | Self::ReasonString(v) => v.bytes(),

            Self::ResponseTopic(v) => v.bytes(),

            Self::CorrelationData(v) | Self::AuthenticationData(v) => v.bytes(),

            Self::UserProperty(v) => v.bytes(),
        };
        PropertyType::bytes() + value_bytes
    }
}

impl DecodePacket for Property {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type = PropertyType::try_from(ba.read_byte()?)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                Ok(Self::PayloadFormatIndicator(BoolData::decode(ba)?))
            }
            PropertyType::MessageExpiryInterval => {
                Ok(Self::MessageExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::ContentType => Ok(Self::ContentType(StringData::decode(ba)?)),
            PropertyType::ResponseTopic => Ok(Self::ResponseTopic(PubTopic::decode(ba)?)),
            PropertyType::CorrelationData => Ok(Self::CorrelationData(BinaryData::decode(ba)?)),
            PropertyType::SubscriptionIdentifier => {
                let id = VarInt::decode(ba)?;
                // The Subscription Identifier can have the value of 1 to
                // 268,435,455. It is a Protocol Error if it is zero.
                if id.is_empty() {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::SubscriptionIdentifier(id))
            }
            PropertyType::SessionExpiryInterval => {
                Ok(Self::SessionExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::AssignedClientIdentifier => {
                Ok(Self::AssignedClientIdentifier(StringData::decode(ba)?))
            }
            PropertyType::ServerKeepAlive => Ok(Self::ServerKeepAlive(U16Data::decode(ba)?)),
            PropertyType::AuthenticationMethod => {
                Ok(Self::AuthenticationMethod(StringData::decode(ba)?))
            }
            PropertyType::AuthenticationData => {
                Ok(Self::AuthenticationData(BinaryData::decode(ba)?))
            }
            PropertyType::RequestProblemInformation => {
                Ok(Self::RequestProblemInformation(BoolData::decode(ba)?))
            }
            PropertyType::WillDelayInterval => Ok(Self::WillDelayInterval(U32Data::decode(ba)?)),
            PropertyType::RequestResponseInformation => {
                Ok(Self::RequestResponseInformation(BoolData::decode(ba)?))
            }
            PropertyType::ResponseInformation => {
                Ok(Self::ResponseInformation(StringData::decode(ba)?))
            }
            PropertyType::ServerReference => Ok(Self::ServerReference(StringData::decode(ba)?)),
            PropertyType::ReasonString => Ok(Self::ReasonString(StringData::decode(ba)?)),
            PropertyType::ReceiveMaximum => {
                let value = U16Data::decode(ba)?;
                // It is a Protocol Error to include the Receive Maximum
                // value 0.
                if value.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::ReceiveMaximum(value))
            }
            PropertyType::TopicAliasMaximum => Ok(Self::TopicAliasMaximum(U16Data::decode(ba)?)),
            PropertyType::TopicAlias => Ok(Self::TopicAlias(U16Data::decode(ba)?)),
            PropertyType::MaximumQoS => {
                let byte = ba.read_byte()?;
                if byte > 1 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(QoS::try_from(byte)?))
            }
            PropertyType::RetainAvailable => Ok(Self::RetainAvailable(BoolData::decode(ba)?)),
            PropertyType::UserProperty => Ok(Self::UserProperty(StringPairData::decode(ba)?)),
            PropertyType::MaximumPacketSize => {
                let value = U32Data::decode(ba)?;
                // It is a Protocol Error to include the Maximum Packet
                // Size value 0.
                if value.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumPacketSize(value))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                Ok(Self::WildcardSubscriptionAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                Ok(Self::SubscriptionIdentifierAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SharedSubscriptionAvailable => {
                Ok(Self::SharedSubscriptionAvailable(BoolData::decode(ba)?))
            }
        }
    }
}

impl EncodePacket for Property {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.property_type() as u8);
        let value_bytes = match self {
            Self::PayloadFormatIndicator(v)
            | Self::RequestProblemInformation(v)
            | Self::RequestResponseInformation(v)
            | Self::RetainAvailable(v)
            | Self::WildcardSubscriptionAvailable(v)
            | Self::SubscriptionIdentifierAvailable(v)
            | Self::SharedSubscriptionAvailable(v) => v.encode(buf)?,

            Self::MaximumQoS(qos) => {
                buf.push(*qos as u8);
                1
            }

            Self::ServerKeepAlive(v)
            | Self::ReceiveMaximum(v)
            | Self::TopicAliasMaximum(v)
            | Self::TopicAlias(v) => v.encode(buf)?,

            Self::MessageExpiryInterval(v)
            | Self::SessionExpiryInterval(v)
            | Self::WillDelayInterval(v)
            | Self::MaximumPacketSize(v) => v.encode(buf)?,

            Self::SubscriptionIdentifier(v) => v.encode(buf)?,

            Self::ContentType(v)
            | Self::AssignedClientIdentifier(v)
            | Self::AuthenticationMethod(v)
            | Self::ResponseInformation(v)
            | Self::ServerReference(v)
            | Self::ReasonString(v) => v.encode(buf)?,

            Self::ResponseTopic(v) => v.encode(buf)?,

            Self::CorrelationData(v) | Self::AuthenticationData(v) => v.encode(buf)?,

            Self::UserProperty(v) => v.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// An ordered list of properties, prefixed by its byte length.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn props(&self) -> &[Property] {
        &self.0
    }

    pub fn push(&mut self, property: Property) -> &mut Self {
        self.0.push(property);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Byte length of the property values without the length prefix.
    #[must_use]
    pub fn value_bytes(&self) -> usize {
        self.0.iter().map(Property::bytes).sum()
    }

    /// Byte length in packet, including the length prefix.
    ///
    /// # Panics
    ///
    /// Never panics; property lists are bounded by the packet length.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = self.value_bytes();
        let prefix = VarInt::from(value_bytes).expect("property list within packet bounds");
        prefix.bytes() + value_bytes
    }

    fn first(&self, property_type: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() == property_type)
    }

    #[must_use]
    pub fn payload_format_indicator(&self) -> Option<bool> {
        match self.first(PropertyType::PayloadFormatIndicator) {
            Some(Property::PayloadFormatIndicator(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn message_expiry_interval(&self) -> Option<u32> {
        match self.first(PropertyType::MessageExpiryInterval) {
            Some(Property::MessageExpiryInterval(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        match self.first(PropertyType::ContentType) {
            Some(Property::ContentType(v)) => Some(v.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn response_topic(&self) -> Option<&str> {
        match self.first(PropertyType::ResponseTopic) {
            Some(Property::ResponseTopic(v)) => Some(v.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn correlation_data(&self) -> Option<&[u8]> {
        match self.first(PropertyType::CorrelationData) {
            Some(Property::CorrelationData(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn session_expiry_interval(&self) -> Option<u32> {
        match self.first(PropertyType::SessionExpiryInterval) {
            Some(Property::SessionExpiryInterval(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn assigned_client_identifier(&self) -> Option<&str> {
        match self.first(PropertyType::AssignedClientIdentifier) {
            Some(Property::AssignedClientIdentifier(v)) => Some(v.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn server_keep_alive(&self) -> Option<u16> {
        match self.first(PropertyType::ServerKeepAlive) {
            Some(Property::ServerKeepAlive(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn authentication_method(&self) -> Option<&str> {
        match self.first(PropertyType::AuthenticationMethod) {
            Some(Property::AuthenticationMethod(v)) => Some(v.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn authentication_data(&self) -> Option<&[u8]> {
        match self.first(PropertyType::AuthenticationData) {
            Some(Property::AuthenticationData(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn will_delay_interval(&self) -> Option<u32> {
        match self.first(PropertyType::WillDelayInterval) {
            Some(Property::WillDelayInterval(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn receive_maximum(&self) -> Option<u16> {
        match self.first(PropertyType::ReceiveMaximum) {
            Some(Property::ReceiveMaximum(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn topic_alias_maximum(&self) -> Option<u16> {
        match self.first(PropertyType::TopicAliasMaximum) {
            Some(Property::TopicAliasMaximum(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn topic_alias(&self) -> Option<u16> {
        match self.first(PropertyType::TopicAlias) {
            Some(Property::TopicAlias(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn maximum_packet_size(&self) -> Option<u32> {
        match self.first(PropertyType::MaximumPacketSize) {
            Some(Property::MaximumPacketSize(v)) => Some(v.value()),
            _ => None,
        }
    }

    #[must_use]
    pub fn user_properties(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .filter_map(|p| match p {
                Property::UserProperty(pair) => Some((pair.key(), pair.value())),
                _ => None,
            })
            .collect()
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let value_bytes = VarInt::decode(ba)?.value();
        let end_offset = ba.offset() + value_bytes;
        if end_offset > ba.len() {
            return Err(DecodeError::OutOfRangeError);
        }

        let mut properties = Vec::new();
        while ba.offset() < end_offset {
            properties.push(Property::decode(ba)?);
        }
        if ba.offset() != end_offset {
            return Err(DecodeError::InvalidRemainingLength);
        }

        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let prefix = VarInt::from(self.value_bytes()).map_err(|_| EncodeError::TooManyData)?;
        prefix.encode(buf)?;
        for property in &self.0 {
            property.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut properties = Properties::new();
        properties
            .push(Property::PayloadFormatIndicator(BoolData::new(true)))
            .push(Property::MessageExpiryInterval(U32Data::new(30)))
            .push(Property::TopicAlias(U16Data::new(4)))
            .push(Property::UserProperty(
                StringPairData::from("origin", "plant-1").unwrap(),
            ))
            .push(Property::UserProperty(
                StringPairData::from("origin", "plant-2").unwrap(),
            ));

        let mut buf = Vec::new();
        properties.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded, properties);
        assert_eq!(decoded.message_expiry_interval(), Some(30));
        assert_eq!(decoded.topic_alias(), Some(4));
        // Duplicate user property keys and their order are preserved.
        assert_eq!(
            decoded.user_properties(),
            vec![("origin", "plant-1"), ("origin", "plant-2")]
        );
    }

    #[test]
    fn test_check_property_type_list() {
        let mut properties = Properties::new();
        properties
            .push(Property::MessageExpiryInterval(U32Data::new(5)))
            .push(Property::MessageExpiryInterval(U32Data::new(6)));
        assert_eq!(
            check_property_type_list(
                properties.props(),
                &[PropertyType::MessageExpiryInterval]
            ),
            Err(PropertyType::MessageExpiryInterval)
        );

        let mut properties = Properties::new();
        properties.push(Property::TopicAlias(U16Data::new(1)));
        assert_eq!(
            check_property_type_list(properties.props(), &[PropertyType::MessageExpiryInterval]),
            Err(PropertyType::TopicAlias)
        );
    }

    #[test]
    fn test_empty_properties_encode_as_single_zero() {
        let properties = Properties::new();
        let mut buf = Vec::new();
        properties.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x00]);
    }

    #[test]
    fn test_zero_receive_maximum_rejected() {
        let buf = [0x03, 0x21, 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba),
            Err(DecodeError::InvalidPropertyValue)
        );
    }
}
