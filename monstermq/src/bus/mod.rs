// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Message bus: symbolic addresses carrying client message batches and
//! request/reply traffic.
//!
//! The local implementation routes inside the process. A clustered
//! deployment routes the same address space across nodes with
//! at-least-once delivery; the session plane tolerates duplicates through
//! packet id reuse detection. Per address and publisher, delivery order
//! equals publish order.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, ErrorKind};
use crate::message::BulkClientMessage;
use crate::metrics::BrokerCounters;

const CHANNEL_CAPACITY: usize = 64;

/// Address of the client delivery endpoint of `node`.
#[must_use]
pub fn client_delivery_address(node: &str) -> String {
    format!("node.{node}.clients")
}

/// Address of the dispatcher counter endpoint of `node`.
#[must_use]
pub fn dispatcher_counters_address(node: &str) -> String {
    format!("node.{node}.metrics.broker")
}

/// Events routed over the bus.
#[derive(Debug)]
pub enum BusEvent {
    /// Deliver a batch of messages to a locally connected client.
    ClientMessages(BulkClientMessage),

    /// Reply with the current subsystem counters.
    CountersRequest(oneshot::Sender<BrokerCounters>),
}

/// Contract of the bus implementations.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Register this node as the consumer of `address`. A second
    /// subscribe replaces the first.
    fn subscribe(&self, address: &str) -> mpsc::Receiver<BusEvent>;

    /// Deliver `event` to the consumer of `address`.
    async fn publish(&self, address: &str, event: BusEvent) -> Result<(), Error>;

    /// Request/reply with an explicit timeout.
    async fn request_counters(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<BrokerCounters, Error>;
}

/// In-process bus keyed by address strings.
#[derive(Debug, Default, Clone)]
pub struct LocalBus {
    channels: Arc<DashMap<String, mpsc::Sender<BusEvent>>>,
}

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Bus for LocalBus {
    fn subscribe(&self, address: &str) -> mpsc::Receiver<BusEvent> {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        self.channels.insert(address.to_string(), sender);
        receiver
    }

    async fn publish(&self, address: &str, event: BusEvent) -> Result<(), Error> {
        let sender = self
            .channels
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                Error::from_string(
                    ErrorKind::BusError,
                    format!("bus: no subscriber at {address}"),
                )
            })?;
        sender.send(event).await.map_err(|err| {
            Error::from_string(ErrorKind::BusError, format!("bus: send failed: {err}"))
        })
    }

    async fn request_counters(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<BrokerCounters, Error> {
        let (reply_sender, reply_receiver) = oneshot::channel();
        self.publish(address, BusEvent::CountersRequest(reply_sender))
            .await?;
        let counters = tokio::time::timeout(timeout, reply_receiver)
            .await?
            .map_err(|err| {
                Error::from_string(ErrorKind::BusError, format!("bus: reply dropped: {err}"))
            })?;
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BrokerMessage;
    use bytes::Bytes;
    use codec::QoS;

    #[tokio::test]
    async fn test_publish_in_order() {
        let bus = LocalBus::new();
        let mut receiver = bus.subscribe("node.a.clients");

        for i in 0..3u32 {
            let message = BrokerMessage::new(
                &format!("t/{i}"),
                Bytes::new(),
                QoS::AtMostOnce,
                "p",
                u64::from(i),
            );
            bus.publish(
                "node.a.clients",
                BusEvent::ClientMessages(BulkClientMessage {
                    client_id: "c1".to_string(),
                    messages: vec![message],
                }),
            )
            .await
            .unwrap();
        }

        for i in 0..3u32 {
            match receiver.recv().await {
                Some(BusEvent::ClientMessages(bulk)) => {
                    assert_eq!(bulk.messages[0].topic(), format!("t/{i}"));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_fails() {
        let bus = LocalBus::new();
        let result = bus
            .publish(
                "node.b.clients",
                BusEvent::ClientMessages(BulkClientMessage {
                    client_id: "c".to_string(),
                    messages: Vec::new(),
                }),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_request_counters_times_out() {
        let bus = LocalBus::new();
        // Subscriber which never replies.
        let _receiver = bus.subscribe("node.a.metrics.broker");
        let result = bus
            .request_counters("node.a.metrics.broker", Duration::from_millis(20))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_request_counters_round_trip() {
        let bus = LocalBus::new();
        let mut receiver = bus.subscribe("node.a.metrics.broker");
        tokio::spawn(async move {
            if let Some(BusEvent::CountersRequest(reply)) = receiver.recv().await {
                let mut counters = BrokerCounters::default();
                counters.sessions = 7;
                let _ = reply.send(counters);
            }
        });

        let counters = bus
            .request_counters("node.a.metrics.broker", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(counters.sessions, 7);
    }
}
