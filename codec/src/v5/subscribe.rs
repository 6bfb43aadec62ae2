// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use super::property::check_property_type_list;
use super::{Properties, PropertyType};
use crate::string_data::StringData;
use crate::topic::SubTopic;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, QoS, VarIntError,
};

/// Properties allowed in a subscribe packet.
pub const SUBSCRIBE_PROPERTIES: &[PropertyType] = &[
    PropertyType::SubscriptionIdentifier,
    PropertyType::UserProperty,
];

/// Retain handling option of a subscription.
///
/// Controls whether retained messages are sent when the subscription is
/// established. It does not affect retained messages sent later.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetainHandling {
    /// Send retained messages at the time of the subscribe.
    #[default]
    Send = 0,

    /// Send retained messages only if the subscription does not currently
    /// exist.
    SendFirst = 1,

    /// Do not send retained messages at the time of the subscribe.
    NoSend = 2,
}

impl TryFrom<u8> for RetainHandling {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Send),
            1 => Ok(Self::SendFirst),
            2 => Ok(Self::NoSend),
            _ => Err(DecodeError::InvalidPacketFlags),
        }
    }
}

/// A topic filter and its subscription options.
///
/// Option bits: 0..=1 maximum QoS, 2 no local, 3 retain as published,
/// 4..=5 retain handling. Bits 6 and 7 are reserved and MUST be zero
/// [MQTT-3.8.3-5].
///
/// The filter is decoded as a raw string; its wildcard syntax is checked
/// with [`SubscribeTopic::is_valid`] afterwards, so one malformed filter
/// gets its own reason code in the SUBACK instead of failing the whole
/// packet.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeTopic {
    topic: StringData,

    /// Maximum QoS at which the server may send messages to the client.
    qos: QoS,

    /// If set, messages MUST NOT be forwarded to a connection with a
    /// client id equal to the client id of the publishing connection
    /// [MQTT-3.8.3-3].
    no_local: bool,

    /// If set, forwarded messages keep the retain flag they were
    /// published with; otherwise the flag is cleared.
    retain_as_published: bool,

    retain_handling: RetainHandling,
}

impl SubscribeTopic {
    /// Create a new filter with default options.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid filter.
    pub fn new(topic: &str, qos: QoS) -> Result<Self, EncodeError> {
        SubTopic::new(topic)?;
        Ok(Self {
            topic: StringData::from(topic)?,
            qos,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    /// True if the filter satisfies the wildcard rules.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        SubTopic::new(self.topic.as_ref()).is_ok()
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_no_local(&mut self, no_local: bool) -> &mut Self {
        self.no_local = no_local;
        self
    }

    #[must_use]
    pub const fn no_local(&self) -> bool {
        self.no_local
    }

    pub fn set_retain_as_published(&mut self, retain_as_published: bool) -> &mut Self {
        self.retain_as_published = retain_as_published;
        self
    }

    #[must_use]
    pub const fn retain_as_published(&self) -> bool {
        self.retain_as_published
    }

    pub fn set_retain_handling(&mut self, retain_handling: RetainHandling) -> &mut Self {
        self.retain_handling = retain_handling;
        self
    }

    #[must_use]
    pub const fn retain_handling(&self) -> RetainHandling {
        self.retain_handling
    }

    /// Byte length in packet.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.topic.bytes() + 1
    }
}

impl DecodePacket for SubscribeTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let topic = StringData::decode(ba)?;

        let flag = ba.read_byte()?;
        if flag & 0b1100_0000 != 0 {
            return Err(DecodeError::InvalidPacketFlags);
        }
        let qos = QoS::try_from(flag & 0b0000_0011)?;
        let no_local = (flag & 0b0000_0100) != 0;
        let retain_as_published = (flag & 0b0000_1000) != 0;
        let retain_handling = RetainHandling::try_from((flag & 0b0011_0000) >> 4)?;

        Ok(Self {
            topic,
            qos,
            no_local,
            retain_as_published,
            retain_handling,
        })
    }
}

impl EncodePacket for SubscribeTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        self.topic.encode(buf)?;

        let mut flag = self.qos as u8;
        if self.no_local {
            flag |= 0b0000_0100;
        }
        if self.retain_as_published {
            flag |= 0b0000_1000;
        }
        flag |= (self.retain_handling as u8) << 4;
        buf.push(flag);

        Ok(self.bytes())
    }
}

/// Request to subscribe to one or more topic filters.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    packet_id: PacketId,
    properties: Properties,
    topics: Vec<SubscribeTopic>,
}

impl SubscribePacket {
    /// Create a subscribe packet with a single filter.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid filter.
    pub fn new(topic: &str, qos: QoS, packet_id: PacketId) -> Result<Self, EncodeError> {
        let topic = SubscribeTopic::new(topic, qos)?;
        Ok(Self {
            packet_id,
            properties: Properties::new(),
            topics: vec![topic],
        })
    }

    /// Create a subscribe packet with multiple filters.
    #[must_use]
    pub fn with_topics(packet_id: PacketId, topics: Vec<SubscribeTopic>) -> Self {
        Self {
            packet_id,
            properties: Properties::new(),
            topics,
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub fn topics(&self) -> &[SubscribeTopic] {
        &self.topics
    }

    fn remaining_length(&self) -> usize {
        PacketId::bytes()
            + self.properties.bytes()
            + self.topics.iter().map(SubscribeTopic::bytes).sum::<usize>()
    }
}

impl DecodePacket for SubscribePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Subscribe {
            return Err(DecodeError::InvalidPacketType);
        }

        let packet_id = PacketId::decode(ba)?;
        if packet_id.value() == 0 {
            return Err(DecodeError::InvalidPacketId);
        }

        let properties = Properties::decode(ba)?;
        if let Err(property_type) =
            check_property_type_list(properties.props(), SUBSCRIBE_PROPERTIES)
        {
            log::error!("v5/SubscribePacket: invalid property type {property_type:?}");
            return Err(DecodeError::InvalidPropertyType);
        }

        let mut consumed = PacketId::bytes() + properties.bytes();
        let mut topics = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let topic = SubscribeTopic::decode(ba)?;
            consumed += topic.bytes();
            topics.push(topic);
        }

        // The payload of a SUBSCRIBE packet MUST contain at least one
        // Topic Filter [MQTT-3.8.3-3].
        if topics.is_empty() {
            return Err(DecodeError::EmptyTopicFilter);
        }

        Ok(Self {
            packet_id,
            properties,
            topics,
        })
    }
}

impl EncodePacket for SubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(PacketType::Subscribe, self.remaining_length())?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        self.properties.encode(buf)?;
        for topic in &self.topics {
            topic.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::Subscribe, self.remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_options() {
        let mut topic = SubscribeTopic::new("sensors/+", QoS::ExactOnce).unwrap();
        topic
            .set_no_local(true)
            .set_retain_as_published(true)
            .set_retain_handling(RetainHandling::SendFirst);
        let packet = SubscribePacket::with_topics(PacketId::new(11), vec![topic]);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribePacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        let topic = &decoded.topics()[0];
        assert!(topic.no_local());
        assert!(topic.retain_as_published());
        assert_eq!(topic.retain_handling(), RetainHandling::SendFirst);
    }

    #[test]
    fn test_malformed_filter_decodes_as_invalid() {
        let mut buf = Vec::new();
        // Packet id + empty properties + one bad filter with options.
        let fixed_header = FixedHeader::new(PacketType::Subscribe, 2 + 1 + 7).unwrap();
        fixed_header.encode(&mut buf).unwrap();
        PacketId::new(4).encode(&mut buf).unwrap();
        Properties::new().encode(&mut buf).unwrap();
        StringData::from("a+/b").unwrap().encode(&mut buf).unwrap();
        buf.push(1);

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribePacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.topics().len(), 1);
        assert!(!decoded.topics()[0].is_valid());
        assert_eq!(decoded.topics()[0].topic(), "a+/b");
    }

    #[test]
    fn test_reserved_option_bits_rejected() {
        let packet = SubscribePacket::new("a/b", QoS::AtMostOnce, PacketId::new(1)).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        // Flip a reserved subscription option bit.
        let last = buf.len() - 1;
        buf[last] |= 0b0100_0000;

        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SubscribePacket::decode(&mut ba),
            Err(DecodeError::InvalidPacketFlags)
        );
    }
}
