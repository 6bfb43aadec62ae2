// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! In-process storage backends, the default for single-node deployments.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use super::{
    LastValueStore, MessageArchive, MetricsStore, RetainedStore, SessionStore, StoredSession,
    StoredSubscription,
};
use crate::error::Error;
use crate::message::{BrokerMessage, QueuedMessage};
use crate::metrics::BrokerMetrics;
use crate::types::ClientId;
use codec::TopicFilter;

#[derive(Debug, Default)]
struct ClientQueue {
    next_sequence: u64,
    entries: VecDeque<QueuedMessage>,
}

#[derive(Debug, Default)]
struct SessionInner {
    sessions: HashMap<ClientId, StoredSession>,
    subscriptions: HashMap<ClientId, BTreeMap<String, StoredSubscription>>,
    queues: HashMap<ClientId, ClientQueue>,
}

/// Hash-map backed session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<SessionInner>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        // Lock poisoning only happens after a panic in another holder;
        // the broker aborts on panics.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_session(&self, client_id: &str) -> Result<Option<StoredSession>, Error> {
        Ok(self.lock().sessions.get(client_id).cloned())
    }

    async fn save_session(&self, session: &StoredSession) -> Result<(), Error> {
        self.lock()
            .sessions
            .insert(session.client_id.clone(), session.clone());
        Ok(())
    }

    async fn remove_session(&self, client_id: &str) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.sessions.remove(client_id);
        inner.subscriptions.remove(client_id);
        inner.queues.remove(client_id);
        Ok(())
    }

    async fn subscriptions(&self, client_id: &str) -> Result<Vec<StoredSubscription>, Error> {
        Ok(self
            .lock()
            .subscriptions
            .get(client_id)
            .map_or_else(Vec::new, |subs| subs.values().cloned().collect()))
    }

    async fn save_subscription(&self, subscription: &StoredSubscription) -> Result<(), Error> {
        self.lock()
            .subscriptions
            .entry(subscription.client_id.clone())
            .or_default()
            .insert(subscription.filter.clone(), subscription.clone());
        Ok(())
    }

    async fn remove_subscription(&self, client_id: &str, filter: &str) -> Result<(), Error> {
        if let Some(subs) = self.lock().subscriptions.get_mut(client_id) {
            subs.remove(filter);
        }
        Ok(())
    }

    async fn clear_subscriptions(&self, client_id: &str) -> Result<(), Error> {
        self.lock().subscriptions.remove(client_id);
        Ok(())
    }

    async fn enqueue(
        &self,
        client_id: &str,
        message: &BrokerMessage,
        limit: usize,
    ) -> Result<u64, Error> {
        let mut inner = self.lock();
        let queue = inner.queues.entry(client_id.to_string()).or_default();
        while limit > 0 && queue.entries.len() >= limit {
            if let Some(dropped) = queue.entries.pop_front() {
                log::warn!(
                    "session store: queue of {client_id} full, dropping sequence {}",
                    dropped.sequence
                );
            }
        }
        let sequence = queue.next_sequence;
        queue.next_sequence += 1;
        queue.entries.push_back(QueuedMessage {
            client_id: client_id.to_string(),
            sequence,
            message: message.clone(),
        });
        Ok(sequence)
    }

    async fn dequeue(&self, client_id: &str, max: usize) -> Result<Vec<QueuedMessage>, Error> {
        let mut inner = self.lock();
        let Some(queue) = inner.queues.get_mut(client_id) else {
            return Ok(Vec::new());
        };
        let count = max.min(queue.entries.len());
        Ok(queue.entries.drain(..count).collect())
    }

    async fn queue_len(&self, client_id: &str) -> Result<usize, Error> {
        Ok(self
            .lock()
            .queues
            .get(client_id)
            .map_or(0, |queue| queue.entries.len()))
    }

    async fn purge_expired_messages(&self, now_ms: u64) -> Result<u64, Error> {
        let mut removed = 0;
        let mut inner = self.lock();
        for queue in inner.queues.values_mut() {
            let before = queue.entries.len();
            queue.entries.retain(|entry| !entry.message.is_expired(now_ms));
            removed += (before - queue.entries.len()) as u64;
        }
        Ok(removed)
    }

    async fn expired_sessions(&self, now_ms: u64) -> Result<Vec<ClientId>, Error> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|session| session.is_expired(now_ms))
            .map(|session| session.client_id.clone())
            .collect())
    }
}

/// Hash-map backed retained message store.
#[derive(Debug, Default)]
pub struct MemoryRetainedStore {
    inner: Mutex<HashMap<String, BrokerMessage>>,
}

impl MemoryRetainedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BrokerMessage>> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RetainedStore for MemoryRetainedStore {
    async fn store(&self, message: &BrokerMessage) -> Result<(), Error> {
        self.lock()
            .insert(message.topic().to_string(), message.clone());
        Ok(())
    }

    async fn remove(&self, topic: &str) -> Result<bool, Error> {
        Ok(self.lock().remove(topic).is_some())
    }

    async fn get(&self, topic: &str) -> Result<Option<BrokerMessage>, Error> {
        Ok(self.lock().get(topic).cloned())
    }

    async fn matching(&self, filter: &TopicFilter) -> Result<Vec<BrokerMessage>, Error> {
        Ok(self
            .lock()
            .iter()
            .filter(|(topic, _)| filter.is_match(topic))
            .map(|(_, message)| message.clone())
            .collect())
    }
}

/// Hash-map backed last-value sink.
#[derive(Debug, Default)]
pub struct MemoryLastValueStore {
    inner: Mutex<HashMap<String, BrokerMessage>>,
}

impl MemoryLastValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LastValueStore for MemoryLastValueStore {
    async fn set_all(&self, batch: &[BrokerMessage]) -> Result<(), Error> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for message in batch {
            inner.insert(message.topic().to_string(), message.clone());
        }
        Ok(())
    }

    async fn get(&self, topic: &str) -> Result<Option<BrokerMessage>, Error> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(topic)
            .cloned())
    }
}

/// Vec backed append-only archive sink.
#[derive(Debug, Default)]
pub struct MemoryMessageArchive {
    inner: Mutex<Vec<BrokerMessage>>,
}

impl MemoryMessageArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived rows, for tests and gauges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageArchive for MemoryMessageArchive {
    async fn append_all(&self, batch: &[BrokerMessage]) -> Result<(), Error> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(batch.iter().cloned());
        Ok(())
    }

    async fn purge_older_than(&self, cutoff_ms: u64) -> Result<u64, Error> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = inner.len();
        inner.retain(|message| message.created_at() >= cutoff_ms);
        Ok((before - inner.len()) as u64)
    }
}

/// Vec backed metrics store.
#[derive(Debug, Default)]
pub struct MemoryMetricsStore {
    inner: Mutex<Vec<BrokerMetrics>>,
}

impl MemoryMetricsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn append(&self, metrics: &BrokerMetrics) -> Result<(), Error> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(metrics.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use codec::QoS;

    fn message(topic: &str, expiry: Option<u32>, created_at: u64) -> BrokerMessage {
        let mut msg = BrokerMessage::new(
            topic,
            Bytes::from_static(b"v"),
            QoS::AtLeastOnce,
            "pub",
            created_at,
        );
        msg.properties_mut().message_expiry_interval = expiry;
        msg
    }

    #[tokio::test]
    async fn test_queue_is_fifo_with_limit() {
        let store = MemorySessionStore::new();
        for i in 0..5u64 {
            store
                .enqueue("c1", &message(&format!("t/{i}"), None, i), 3)
                .await
                .unwrap();
        }
        assert_eq!(store.queue_len("c1").await.unwrap(), 3);

        let drained = store.dequeue("c1", 10).await.unwrap();
        let topics: Vec<&str> = drained.iter().map(|m| m.message.topic()).collect();
        // The two oldest entries were dropped at the limit.
        assert_eq!(topics, vec!["t/2", "t/3", "t/4"]);
        assert!(drained.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[tokio::test]
    async fn test_purge_expired_messages() {
        let store = MemorySessionStore::new();
        store.enqueue("c1", &message("a", Some(2), 0), 0).await.unwrap();
        store.enqueue("c1", &message("b", Some(10), 0), 0).await.unwrap();
        store.enqueue("c1", &message("c", None, 0), 0).await.unwrap();

        let removed = store.purge_expired_messages(3_000).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.queue_len("c1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retained_store_replace_and_match() {
        let store = MemoryRetainedStore::new();
        store.store(&message("r/1", None, 0)).await.unwrap();
        store.store(&message("r/2", None, 0)).await.unwrap();
        store.store(&message("r/1", None, 5)).await.unwrap();

        let got = store.get("r/1").await.unwrap().unwrap();
        assert_eq!(got.created_at(), 5);

        let filter = TopicFilter::parse("r/#").unwrap();
        assert_eq!(store.matching(&filter).await.unwrap().len(), 2);

        assert!(store.remove("r/1").await.unwrap());
        assert!(!store.remove("r/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_archive_purge() {
        let archive = MemoryMessageArchive::new();
        archive
            .append_all(&[message("a", None, 100), message("b", None, 200)])
            .await
            .unwrap();
        assert_eq!(archive.purge_older_than(150).await.unwrap(), 1);
        assert_eq!(archive.len(), 1);
    }
}
