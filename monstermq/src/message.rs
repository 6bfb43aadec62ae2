// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! The canonical internal message and its MQTT 5.0 properties.

use bytes::Bytes;
use codec::v5::{Properties, Property};
use codec::{
    BinaryData, BoolData, EncodeError, PacketId, PubTopic, QoS, StringData, StringPairData,
    U32Data,
};

use crate::types::ClientId;

/// Sentinel used by storage backends for "no message expiry".
pub const NO_EXPIRY: i64 = -1;

/// Optional MQTT 5.0 properties of a message. All fields survive cloning
/// and persistence; user property order and duplicates are significant.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    /// 0 = unspecified bytes, 1 = UTF-8 character data.
    pub payload_format_indicator: Option<bool>,

    /// Lifetime in seconds from the creation timestamp.
    pub message_expiry_interval: Option<u32>,

    pub content_type: Option<String>,

    pub response_topic: Option<String>,

    pub correlation_data: Option<Vec<u8>>,

    pub user_properties: Vec<(String, String)>,
}

impl MessageProperties {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload_format_indicator.is_none()
            && self.message_expiry_interval.is_none()
            && self.content_type.is_none()
            && self.response_topic.is_none()
            && self.correlation_data.is_none()
            && self.user_properties.is_empty()
    }

    /// Extract message properties from a publish packet property list.
    #[must_use]
    pub fn from_packet(properties: &Properties) -> Self {
        Self {
            payload_format_indicator: properties.payload_format_indicator(),
            message_expiry_interval: properties.message_expiry_interval(),
            content_type: properties.content_type().map(str::to_string),
            response_topic: properties.response_topic().map(str::to_string),
            correlation_data: properties.correlation_data().map(<[u8]>::to_vec),
            user_properties: properties
                .user_properties()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Canonical internal representation of a published message.
///
/// The topic name is always concrete here; topic aliases are resolved by
/// the receiving endpoint before the message enters the dispatch plane.
/// The packet id is re-assigned per subscriber by the delivering endpoint,
/// so it is not part of this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    topic: String,
    payload: Bytes,
    qos: QoS,
    retain: bool,
    dup: bool,
    origin: ClientId,

    /// Milliseconds since the unix epoch at which the broker accepted the
    /// message.
    created_at: u64,

    properties: MessageProperties,
}

impl BrokerMessage {
    #[must_use]
    pub fn new(topic: &str, payload: Bytes, qos: QoS, origin: &str, created_at: u64) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            qos,
            retain: false,
            dup: false,
            origin: origin.to_string(),
            created_at,
            properties: MessageProperties::default(),
        }
    }

    /// Normalize an MQTT 3.1.1 publish packet.
    #[must_use]
    pub fn from_v3_publish(
        packet: &codec::v3::PublishPacket,
        origin: &str,
        created_at: u64,
    ) -> Self {
        Self {
            topic: packet.topic().to_string(),
            payload: packet.payload().clone(),
            qos: packet.qos(),
            retain: packet.retain(),
            dup: packet.dup(),
            origin: origin.to_string(),
            created_at,
            properties: MessageProperties::default(),
        }
    }

    /// Normalize an MQTT 5.0 publish packet. `topic` is the concrete
    /// topic after alias resolution.
    #[must_use]
    pub fn from_v5_publish(
        packet: &codec::v5::PublishPacket,
        topic: &str,
        origin: &str,
        created_at: u64,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            payload: packet.payload().clone(),
            qos: packet.qos(),
            retain: packet.retain(),
            dup: packet.dup(),
            origin: origin.to_string(),
            created_at,
            properties: MessageProperties::from_packet(packet.properties()),
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    pub fn set_dup(&mut self, dup: bool) -> &mut Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }

    #[must_use]
    pub const fn properties(&self) -> &MessageProperties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut MessageProperties {
        &mut self.properties
    }

    /// Milliseconds timestamp after which the message must not be
    /// delivered, or `None` if it never expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<u64> {
        self.properties
            .message_expiry_interval
            .map(|secs| self.created_at + u64::from(secs) * 1000)
    }

    /// True once the expiry interval has fully elapsed.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at().is_some_and(|deadline| now_ms >= deadline)
    }

    /// Remaining expiry seconds to carry on an outbound publish, rounded
    /// down. Returns `None` when the message has no expiry; `Some(0)`
    /// means the property is omitted and the message may still go out
    /// immediately but must not be queued any further.
    #[must_use]
    pub fn outbound_expiry(&self, now_ms: u64) -> Option<u32> {
        self.properties.message_expiry_interval.map(|secs| {
            let elapsed_secs = now_ms.saturating_sub(self.created_at) / 1000;
            u32::try_from(u64::from(secs).saturating_sub(elapsed_secs)).unwrap_or(0)
        })
    }

    /// Build the property list of an outbound 5.0 publish.
    fn outbound_properties(&self, now_ms: u64) -> Result<Properties, EncodeError> {
        let mut properties = Properties::new();
        if let Some(indicator) = self.properties.payload_format_indicator {
            properties.push(Property::PayloadFormatIndicator(BoolData::new(indicator)));
        }
        if let Some(remaining) = self.outbound_expiry(now_ms) {
            if remaining > 0 {
                properties.push(Property::MessageExpiryInterval(U32Data::new(remaining)));
            }
        }
        if let Some(content_type) = &self.properties.content_type {
            properties.push(Property::ContentType(StringData::from(content_type)?));
        }
        if let Some(response_topic) = &self.properties.response_topic {
            properties.push(Property::ResponseTopic(PubTopic::new(response_topic)?));
        }
        if let Some(correlation_data) = &self.properties.correlation_data {
            properties.push(Property::CorrelationData(BinaryData::from_slice(
                correlation_data,
            )?));
        }
        for (key, value) in &self.properties.user_properties {
            properties.push(Property::UserProperty(StringPairData::from(key, value)?));
        }
        Ok(properties)
    }

    /// Render an outbound 3.1.1 publish packet for one subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if the topic is invalid.
    pub fn to_v3_publish(
        &self,
        packet_id: PacketId,
        qos: QoS,
        retain: bool,
    ) -> Result<codec::v3::PublishPacket, EncodeError> {
        let mut packet = codec::v3::PublishPacket::new(&self.topic, qos, self.payload.clone())?;
        packet.set_retain(retain);
        if qos != QoS::AtMostOnce {
            packet.set_packet_id(packet_id);
            if self.dup {
                packet.set_dup(true)?;
            }
        }
        Ok(packet)
    }

    /// Render an outbound 5.0 publish packet for one subscriber, with the
    /// message expiry recomputed against `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns error if the topic or a property value is invalid.
    pub fn to_v5_publish(
        &self,
        packet_id: PacketId,
        qos: QoS,
        retain: bool,
        now_ms: u64,
    ) -> Result<codec::v5::PublishPacket, EncodeError> {
        let mut packet = codec::v5::PublishPacket::new(&self.topic, qos, self.payload.clone())?;
        packet.set_retain(retain);
        if qos != QoS::AtMostOnce {
            packet.set_packet_id(packet_id);
            if self.dup {
                packet.set_dup(true)?;
            }
        }
        *packet.properties_mut() = self.outbound_properties(now_ms)?;
        Ok(packet)
    }
}

/// One entry of a per-client offline queue, ordered by `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub client_id: ClientId,
    pub sequence: u64,
    pub message: BrokerMessage,
}

/// A batch of messages addressed to a single client, as routed over the
/// message bus between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkClientMessage {
    pub client_id: ClientId,
    pub messages: Vec<BrokerMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_expiry(expiry: Option<u32>, created_at: u64) -> BrokerMessage {
        let mut msg = BrokerMessage::new(
            "s/x",
            Bytes::from_static(b"v"),
            QoS::AtLeastOnce,
            "pub-1",
            created_at,
        );
        msg.properties_mut().message_expiry_interval = expiry;
        msg
    }

    #[test]
    fn test_expiry_arithmetic() {
        let msg = message_with_expiry(Some(10), 1_000);
        assert!(!msg.is_expired(1_000));
        assert!(!msg.is_expired(10_999));
        assert!(msg.is_expired(11_000));

        // Three seconds later, seven seconds remain.
        assert_eq!(msg.outbound_expiry(4_000), Some(7));
        // Rounded down.
        assert_eq!(msg.outbound_expiry(4_999), Some(7));
        // At the deadline the property value reaches zero.
        assert_eq!(msg.outbound_expiry(11_000), Some(0));

        let msg = message_with_expiry(None, 1_000);
        assert!(!msg.is_expired(u64::MAX));
        assert_eq!(msg.outbound_expiry(u64::MAX), None);
    }

    #[test]
    fn test_outbound_v5_omits_spent_expiry() {
        let msg = message_with_expiry(Some(2), 0);
        let packet = msg
            .to_v5_publish(PacketId::new(1), QoS::AtLeastOnce, false, 2_000)
            .unwrap();
        assert_eq!(packet.properties().message_expiry_interval(), None);

        let packet = msg
            .to_v5_publish(PacketId::new(1), QoS::AtLeastOnce, false, 500)
            .unwrap();
        assert_eq!(packet.properties().message_expiry_interval(), Some(1));
    }

    #[test]
    fn test_clone_preserves_properties() {
        let mut msg = BrokerMessage::new("a", Bytes::new(), QoS::AtMostOnce, "c", 0);
        msg.properties_mut().content_type = Some("application/json".to_string());
        msg.properties_mut()
            .user_properties
            .push(("k".to_string(), "v1".to_string()));
        msg.properties_mut()
            .user_properties
            .push(("k".to_string(), "v2".to_string()));

        let copy = msg.clone();
        assert_eq!(copy.properties(), msg.properties());
    }
}
