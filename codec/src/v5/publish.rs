// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use bytes::Bytes;
use std::io::Write;

use super::property::check_property_type_list;
use super::{Properties, PropertyType};
use crate::string_data::StringData;
use crate::topic::PubTopic;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, QoS, VarIntError,
};

/// Properties allowed in a publish packet.
pub const PUBLISH_PROPERTIES: &[PropertyType] = &[
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::TopicAlias,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
    PropertyType::ContentType,
];

/// An MQTT 5.0 application message, in either direction.
///
/// The topic name may be empty when a topic alias property is present; the
/// receiver then resolves the topic from its alias table. In every other
/// case an empty topic name is a protocol error.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishPacket {
    /// The DUP flag MUST be set to 0 for all QoS 0 messages [MQTT-3.3.1-2].
    dup: bool,

    qos: QoS,

    retain: bool,

    /// Possibly empty; must not contain wildcard characters.
    topic: StringData,

    /// Only meaningful when `qos` is 1 or 2.
    packet_id: PacketId,

    properties: Properties,

    payload: Bytes,
}

impl PublishPacket {
    /// Create a new publish packet.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn new(topic: &str, qos: QoS, payload: Bytes) -> Result<Self, EncodeError> {
        PubTopic::new(topic)?;
        Ok(Self {
            dup: false,
            qos,
            retain: false,
            topic: StringData::from(topic)?,
            packet_id: PacketId::new(0),
            properties: Properties::new(),
            payload,
        })
    }

    /// Create a publish packet with an empty topic name, to be resolved
    /// through the topic alias in `properties`.
    #[must_use]
    pub fn with_alias_only(qos: QoS, properties: Properties, payload: Bytes) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic: StringData::new(),
            packet_id: PacketId::new(0),
            properties,
            payload,
        }
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// Update the dup flag.
    ///
    /// # Errors
    ///
    /// Returns error when setting dup on a QoS 0 packet.
    pub fn set_dup(&mut self, dup: bool) -> Result<&mut Self, EncodeError> {
        if dup && self.qos == QoS::AtMostOnce {
            return Err(EncodeError::InvalidPacketType);
        }
        self.dup = dup;
        Ok(self)
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    pub fn set_qos(&mut self, qos: QoS) -> &mut Self {
        if qos == QoS::AtMostOnce {
            self.packet_id = PacketId::new(0);
        }
        self.qos = qos;
        self
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// Topic name; empty when only a topic alias is carried.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    /// Replace the topic name.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn set_topic(&mut self, topic: &str) -> Result<&mut Self, EncodeError> {
        PubTopic::new(topic)?;
        self.topic = StringData::from(topic)?;
        Ok(self)
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length =
            self.topic.bytes() + self.properties.bytes() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            remaining_length += PacketId::bytes();
        }

        FixedHeader::new(
            PacketType::Publish {
                dup: self.dup,
                qos: self.qos,
                retain: self.retain,
            },
            remaining_length,
        )
    }
}

impl DecodePacket for PublishPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() else {
            return Err(DecodeError::InvalidPacketType);
        };

        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let topic = StringData::decode(ba)?;
        if !topic.is_empty() {
            // Reject wildcards and empty segments.
            PubTopic::new(topic.as_ref())?;
        }

        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::new(0)
        } else {
            let packet_id = PacketId::decode(ba)?;
            if packet_id.value() == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            packet_id
        };

        let properties = Properties::decode(ba)?;
        if let Err(property_type) = check_property_type_list(properties.props(), PUBLISH_PROPERTIES)
        {
            log::error!("v5/PublishPacket: invalid property type {property_type:?}");
            return Err(DecodeError::InvalidPropertyType);
        }

        // An empty topic requires a topic alias to resolve it.
        if topic.is_empty() && properties.topic_alias().is_none() {
            return Err(DecodeError::InvalidTopic);
        }

        let mut consumed = topic.bytes() + properties.bytes();
        if qos != QoS::AtMostOnce {
            consumed += PacketId::bytes();
        }
        let payload_len = fixed_header
            .remaining_length()
            .checked_sub(consumed)
            .ok_or(DecodeError::InvalidRemainingLength)?;
        let payload = Bytes::copy_from_slice(ba.read_bytes(payload_len)?);

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            properties,
            payload,
        })
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;

        self.topic.encode(buf)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.encode(buf)?;
        }
        self.properties.encode(buf)?;
        buf.write_all(&self.payload)?;

        Ok(buf.len() - old_len)
    }
}

impl Packet for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
        }
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v5::Property;
    use crate::{U16Data, U32Data};

    #[test]
    fn test_round_trip_with_properties() {
        let mut packet =
            PublishPacket::new("sensors/a", QoS::AtLeastOnce, Bytes::from_static(b"v")).unwrap();
        packet.set_packet_id(PacketId::new(3));
        packet
            .properties_mut()
            .push(Property::MessageExpiryInterval(U32Data::new(60)))
            .push(Property::TopicAlias(U16Data::new(1)));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.properties().message_expiry_interval(), Some(60));
        assert_eq!(decoded.properties().topic_alias(), Some(1));
    }

    #[test]
    fn test_empty_topic_with_alias() {
        let mut properties = Properties::new();
        properties.push(Property::TopicAlias(U16Data::new(2)));
        let packet =
            PublishPacket::with_alias_only(QoS::AtMostOnce, properties, Bytes::from_static(b"v"));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert!(decoded.topic().is_empty());
        assert_eq!(decoded.properties().topic_alias(), Some(2));
    }

    #[test]
    fn test_empty_topic_without_alias_rejected() {
        let packet =
            PublishPacket::with_alias_only(QoS::AtMostOnce, Properties::new(), Bytes::new());
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishPacket::decode(&mut ba),
            Err(DecodeError::InvalidTopic)
        );
    }
}
