// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use super::property::check_property_type_list;
use super::{Properties, PropertyType};
use crate::string_data::StringData;
use crate::topic::SubTopic;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, VarIntError,
};

/// Properties allowed in an unsubscribe packet.
pub const UNSUBSCRIBE_PROPERTIES: &[PropertyType] = &[PropertyType::UserProperty];

/// Request to remove one or more subscriptions.
///
/// Filters are decoded as raw strings; a malformed one simply matches no
/// stored subscription.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    packet_id: PacketId,
    properties: Properties,
    topics: Vec<StringData>,
}

impl UnsubscribePacket {
    /// Create an unsubscribe packet with a single filter.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid filter.
    pub fn new(topic: &str, packet_id: PacketId) -> Result<Self, EncodeError> {
        SubTopic::new(topic)?;
        Ok(Self {
            packet_id,
            properties: Properties::new(),
            topics: vec![StringData::from(topic)?],
        })
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn topics(&self) -> &[StringData] {
        &self.topics
    }

    fn remaining_length(&self) -> usize {
        PacketId::bytes()
            + self.properties.bytes()
            + self.topics.iter().map(StringData::bytes).sum::<usize>()
    }
}

impl DecodePacket for UnsubscribePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Unsubscribe {
            return Err(DecodeError::InvalidPacketType);
        }

        let packet_id = PacketId::decode(ba)?;
        if packet_id.value() == 0 {
            return Err(DecodeError::InvalidPacketId);
        }

        let properties = Properties::decode(ba)?;
        if let Err(property_type) =
            check_property_type_list(properties.props(), UNSUBSCRIBE_PROPERTIES)
        {
            log::error!("v5/UnsubscribePacket: invalid property type {property_type:?}");
            return Err(DecodeError::InvalidPropertyType);
        }

        let mut consumed = PacketId::bytes() + properties.bytes();
        let mut topics = Vec::new();
        while consumed < fixed_header.remaining_length() {
            let topic = StringData::decode(ba)?;
            consumed += topic.bytes();
            topics.push(topic);
        }

        // The payload of an UNSUBSCRIBE packet MUST contain at least one
        // Topic Filter [MQTT-3.10.3-2].
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

impl EncodePacket for UnsubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(PacketType::Unsubscribe, self.remaining_length())?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        self.properties.encode(buf)?;
        for topic in &self.topics {
            topic.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = FixedHeader::new(PacketType::Unsubscribe, self.remaining_length())?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}
