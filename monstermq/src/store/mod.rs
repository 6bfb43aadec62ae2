// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Storage contracts of the message plane and their backends.
//!
//! The supported backends form a closed set resolved from config at
//! startup; each backend enum delegates to a concrete implementation.

use async_trait::async_trait;

use crate::config;
use crate::error::Error;
use crate::message::{BrokerMessage, MessageProperties, QueuedMessage};
use crate::metrics::BrokerMetrics;
use crate::types::{ClientId, NodeId};
use codec::TopicFilter;

mod memory;
#[cfg(feature = "pgsql_conn")]
mod pgsql;

pub use memory::{
    MemoryLastValueStore, MemoryMessageArchive, MemoryMetricsStore, MemoryRetainedStore,
    MemorySessionStore,
};
#[cfg(feature = "pgsql_conn")]
pub use pgsql::{
    PgLastValueStore, PgMessageArchive, PgMetricsStore, PgPool, PgRetainedStore, PgSessionStore,
};

/// Persisted connect state of one client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub client_id: ClientId,
    pub clean_start: bool,

    /// Seconds the session survives a disconnect; `u32::MAX` never
    /// expires.
    pub session_expiry_interval: u32,

    pub receive_maximum: u16,
    pub maximum_packet_size: u32,
    pub topic_alias_maximum: u16,

    pub connected: bool,

    /// Node currently or last owning this session.
    pub node_id: NodeId,

    /// Millisecond timestamp of the last disconnect; zero while
    /// connected.
    pub disconnected_at: u64,
}

impl StoredSession {
    /// True once a disconnected session has outlived its expiry.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        if self.connected || self.session_expiry_interval == u32::MAX {
            return false;
        }
        let deadline =
            self.disconnected_at + u64::from(self.session_expiry_interval) * 1000;
        now_ms >= deadline
    }
}

/// Persisted subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSubscription {
    pub client_id: ClientId,
    pub filter: String,
    pub qos: u8,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: u8,
}

/// Sessions, subscriptions and per-client offline queues.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, client_id: &str) -> Result<Option<StoredSession>, Error>;

    async fn save_session(&self, session: &StoredSession) -> Result<(), Error>;

    async fn remove_session(&self, client_id: &str) -> Result<(), Error>;

    async fn subscriptions(&self, client_id: &str) -> Result<Vec<StoredSubscription>, Error>;

    async fn save_subscription(&self, subscription: &StoredSubscription) -> Result<(), Error>;

    async fn remove_subscription(&self, client_id: &str, filter: &str) -> Result<(), Error>;

    async fn clear_subscriptions(&self, client_id: &str) -> Result<(), Error>;

    /// Append to the offline queue, returning the assigned sequence.
    /// When the queue is at `limit`, the oldest entry is dropped first.
    async fn enqueue(
        &self,
        client_id: &str,
        message: &BrokerMessage,
        limit: usize,
    ) -> Result<u64, Error>;

    /// Remove and return up to `max` queued messages in sequence order.
    async fn dequeue(&self, client_id: &str, max: usize) -> Result<Vec<QueuedMessage>, Error>;

    async fn queue_len(&self, client_id: &str) -> Result<usize, Error>;

    /// Drop queued messages whose expiry elapsed. Returns the removed
    /// count.
    async fn purge_expired_messages(&self, now_ms: u64) -> Result<u64, Error>;

    /// Client ids of disconnected sessions past their expiry.
    async fn expired_sessions(&self, now_ms: u64) -> Result<Vec<ClientId>, Error>;
}

/// Topic -> last retained message.
#[async_trait]
pub trait RetainedStore: Send + Sync {
    /// Store the retained message of its topic, replacing any previous
    /// one.
    async fn store(&self, message: &BrokerMessage) -> Result<(), Error>;

    async fn remove(&self, topic: &str) -> Result<bool, Error>;

    async fn get(&self, topic: &str) -> Result<Option<BrokerMessage>, Error>;

    /// All retained messages whose topic matches `filter`.
    async fn matching(&self, filter: &TopicFilter) -> Result<Vec<BrokerMessage>, Error>;
}

/// Current-value projection of an archive group, overwriting by topic.
#[async_trait]
pub trait LastValueStore: Send + Sync {
    async fn set_all(&self, batch: &[BrokerMessage]) -> Result<(), Error>;

    async fn get(&self, topic: &str) -> Result<Option<BrokerMessage>, Error>;
}

/// Append-only, timestamped archive of an archive group.
#[async_trait]
pub trait MessageArchive: Send + Sync {
    async fn append_all(&self, batch: &[BrokerMessage]) -> Result<(), Error>;

    /// Delete rows created before `cutoff_ms`. Returns the removed count.
    async fn purge_older_than(&self, cutoff_ms: u64) -> Result<u64, Error>;
}

/// Aggregated broker metrics, appended per interval.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn append(&self, metrics: &BrokerMetrics) -> Result<(), Error>;
}

/// Session store backend resolved from config.
#[derive(Debug)]
pub enum SessionBackend {
    Memory(MemorySessionStore),
    #[cfg(feature = "pgsql_conn")]
    Postgres(PgSessionStore),
}

/// Retained store backend resolved from config.
#[derive(Debug)]
pub enum RetainedBackend {
    Memory(MemoryRetainedStore),
    #[cfg(feature = "pgsql_conn")]
    Postgres(PgRetainedStore),
}

/// Metrics store backend resolved from config.
#[derive(Debug)]
pub enum MetricsBackend {
    Memory(MemoryMetricsStore),
    #[cfg(feature = "pgsql_conn")]
    Postgres(PgMetricsStore),
}

macro_rules! delegate_backend {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            Self::Memory($inner) => $call,
            #[cfg(feature = "pgsql_conn")]
            Self::Postgres($inner) => $call,
        }
    };
}

#[async_trait]
impl SessionStore for SessionBackend {
    async fn load_session(&self, client_id: &str) -> Result<Option<StoredSession>, Error> {
        delegate_backend!(self, s => s.load_session(client_id).await)
    }

    async fn save_session(&self, session: &StoredSession) -> Result<(), Error> {
        delegate_backend!(self, s => s.save_session(session).await)
    }

    async fn remove_session(&self, client_id: &str) -> Result<(), Error> {
        delegate_backend!(self, s => s.remove_session(client_id).await)
    }

    async fn subscriptions(&self, client_id: &str) -> Result<Vec<StoredSubscription>, Error> {
        delegate_backend!(self, s => s.subscriptions(client_id).await)
    }

    async fn save_subscription(&self, subscription: &StoredSubscription) -> Result<(), Error> {
        delegate_backend!(self, s => s.save_subscription(subscription).await)
    }

    async fn remove_subscription(&self, client_id: &str, filter: &str) -> Result<(), Error> {
        delegate_backend!(self, s => s.remove_subscription(client_id, filter).await)
    }

    async fn clear_subscriptions(&self, client_id: &str) -> Result<(), Error> {
        delegate_backend!(self, s => s.clear_subscriptions(client_id).await)
    }

    async fn enqueue(
        &self,
        client_id: &str,
        message: &BrokerMessage,
        limit: usize,
    ) -> Result<u64, Error> {
        delegate_backend!(self, s => s.enqueue(client_id, message, limit).await)
    }

    async fn dequeue(&self, client_id: &str, max: usize) -> Result<Vec<QueuedMessage>, Error> {
        delegate_backend!(self, s => s.dequeue(client_id, max).await)
    }

    async fn queue_len(&self, client_id: &str) -> Result<usize, Error> {
        delegate_backend!(self, s => s.queue_len(client_id).await)
    }

    async fn purge_expired_messages(&self, now_ms: u64) -> Result<u64, Error> {
        delegate_backend!(self, s => s.purge_expired_messages(now_ms).await)
    }

    async fn expired_sessions(&self, now_ms: u64) -> Result<Vec<ClientId>, Error> {
        delegate_backend!(self, s => s.expired_sessions(now_ms).await)
    }
}

#[async_trait]
impl RetainedStore for RetainedBackend {
    async fn store(&self, message: &BrokerMessage) -> Result<(), Error> {
        delegate_backend!(self, s => s.store(message).await)
    }

    async fn remove(&self, topic: &str) -> Result<bool, Error> {
        delegate_backend!(self, s => s.remove(topic).await)
    }

    async fn get(&self, topic: &str) -> Result<Option<BrokerMessage>, Error> {
        delegate_backend!(self, s => s.get(topic).await)
    }

    async fn matching(&self, filter: &TopicFilter) -> Result<Vec<BrokerMessage>, Error> {
        delegate_backend!(self, s => s.matching(filter).await)
    }
}

#[async_trait]
impl MetricsStore for MetricsBackend {
    async fn append(&self, metrics: &BrokerMetrics) -> Result<(), Error> {
        delegate_backend!(self, s => s.append(metrics).await)
    }
}

impl SessionBackend {
    /// Resolve the configured session store backend.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be initialized; a startup
    /// storage failure aborts the broker.
    pub async fn build(storage: &config::Storage) -> Result<Self, Error> {
        match storage.session_store() {
            config::Backend::Memory => Ok(Self::Memory(MemorySessionStore::new())),
            #[cfg(feature = "pgsql_conn")]
            config::Backend::Postgres => {
                let pool = PgPool::connect(storage.pg_connection().unwrap_or_default()).await?;
                Ok(Self::Postgres(PgSessionStore::new(pool).await?))
            }
            #[cfg(not(feature = "pgsql_conn"))]
            config::Backend::Postgres => Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "postgres backend requires the pgsql_conn feature",
            )),
        }
    }
}

impl RetainedBackend {
    /// Resolve the configured retained store backend.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be initialized.
    pub async fn build(storage: &config::Storage) -> Result<Self, Error> {
        match storage.retained_store() {
            config::Backend::Memory => Ok(Self::Memory(MemoryRetainedStore::new())),
            #[cfg(feature = "pgsql_conn")]
            config::Backend::Postgres => {
                let pool = PgPool::connect(storage.pg_connection().unwrap_or_default()).await?;
                Ok(Self::Postgres(PgRetainedStore::new(pool).await?))
            }
            #[cfg(not(feature = "pgsql_conn"))]
            config::Backend::Postgres => Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "postgres backend requires the pgsql_conn feature",
            )),
        }
    }
}

impl MetricsBackend {
    /// Resolve the configured metrics store backend.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be initialized.
    pub async fn build(storage: &config::Storage) -> Result<Self, Error> {
        match storage.metrics_store() {
            config::Backend::Memory => Ok(Self::Memory(MemoryMetricsStore::new())),
            #[cfg(feature = "pgsql_conn")]
            config::Backend::Postgres => {
                let pool = PgPool::connect(storage.pg_connection().unwrap_or_default()).await?;
                Ok(Self::Postgres(PgMetricsStore::new(pool).await?))
            }
            #[cfg(not(feature = "pgsql_conn"))]
            config::Backend::Postgres => Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "postgres backend requires the pgsql_conn feature",
            )),
        }
    }
}

/// Serialize message properties with the wire codec, for persistence.
#[must_use]
pub fn encode_properties(properties: &MessageProperties) -> Vec<u8> {
    use codec::v5::Property;
    use codec::{BinaryData, BoolData, EncodePacket, StringData, StringPairData, U32Data};

    let mut list = codec::v5::Properties::new();
    if let Some(indicator) = properties.payload_format_indicator {
        list.push(Property::PayloadFormatIndicator(BoolData::new(indicator)));
    }
    if let Some(expiry) = properties.message_expiry_interval {
        list.push(Property::MessageExpiryInterval(U32Data::new(expiry)));
    }
    if let Some(content_type) = &properties.content_type {
        if let Ok(value) = StringData::from(content_type) {
            list.push(Property::ContentType(value));
        }
    }
    if let Some(response_topic) = &properties.response_topic {
        if let Ok(value) = codec::PubTopic::new(response_topic) {
            list.push(Property::ResponseTopic(value));
        }
    }
    if let Some(correlation_data) = &properties.correlation_data {
        if let Ok(value) = BinaryData::from_slice(correlation_data) {
            list.push(Property::CorrelationData(value));
        }
    }
    for (key, value) in &properties.user_properties {
        if let Ok(pair) = StringPairData::from(key, value) {
            list.push(Property::UserProperty(pair));
        }
    }

    let mut buf = Vec::new();
    if let Err(err) = list.encode(&mut buf) {
        log::error!("store: failed to encode message properties: {err:?}");
        buf.clear();
        buf.push(0);
    }
    buf
}

/// Inverse of [`encode_properties`].
#[must_use]
pub fn decode_properties(bytes: &[u8]) -> MessageProperties {
    use codec::{ByteArray, DecodePacket};

    let mut ba = ByteArray::new(bytes);
    match codec::v5::Properties::decode(&mut ba) {
        Ok(list) => MessageProperties::from_packet(&list),
        Err(err) => {
            log::error!("store: failed to decode message properties: {err:?}");
            MessageProperties::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_round_trip() {
        let mut properties = MessageProperties::default();
        properties.payload_format_indicator = Some(true);
        properties.message_expiry_interval = Some(300);
        properties.content_type = Some("text/plain".to_string());
        properties.correlation_data = Some(vec![1, 2, 3]);
        properties
            .user_properties
            .push(("a".to_string(), "1".to_string()));

        let bytes = encode_properties(&properties);
        assert_eq!(decode_properties(&bytes), properties);
    }

    #[test]
    fn test_stored_session_expiry() {
        let mut session = StoredSession {
            client_id: "c".to_string(),
            clean_start: false,
            session_expiry_interval: 10,
            receive_maximum: 100,
            maximum_packet_size: 1024,
            topic_alias_maximum: 0,
            connected: false,
            node_id: "node-0".to_string(),
            disconnected_at: 1_000,
        };
        assert!(!session.is_expired(10_999));
        assert!(session.is_expired(11_000));

        session.connected = true;
        assert!(!session.is_expired(u64::MAX));

        session.connected = false;
        session.session_expiry_interval = u32::MAX;
        assert!(!session.is_expired(u64::MAX));
    }
}
