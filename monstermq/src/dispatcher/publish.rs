// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! The publish pipeline: retained update, archive fan-out, subscriber
//! resolution, per-recipient transform and delivery.

use codec::QoS;

use super::Dispatcher;
use crate::bus::{Bus, BusEvent};
use crate::commands::{
    DispatcherToArchiveCmd, DispatcherToListenerCmd, DispatcherToMetricsCmd, OutboundPublish,
};
use crate::message::{BrokerMessage, BulkClientMessage};
use crate::store::{RetainedStore, SessionStore};
use crate::types::{now_ms, SessionGid};

impl Dispatcher {
    pub(super) async fn on_listener_publish(&mut self, gid: SessionGid, message: BrokerMessage) {
        let _ = gid;
        self.send_metrics(DispatcherToMetricsCmd::PublishPacketReceived(
            1,
            message.payload().len(),
        ))
        .await;
        self.dispatch_message(message, false).await;
    }

    /// Run one accepted message through the whole pipeline.
    /// `broker_origin` marks messages the broker itself created, like
    /// `$SYS` gauges and will messages.
    pub(super) async fn dispatch_message(&mut self, message: BrokerMessage, broker_origin: bool) {
        // 1. Retained update: a non-empty retained payload replaces the
        //    stored message, an empty one clears the slot.
        if message.retain() {
            if message.payload().is_empty() {
                match self.retained_store.remove(message.topic()).await {
                    Ok(true) => {
                        self.retained_count = self.retained_count.saturating_sub(1);
                        self.send_metrics(DispatcherToMetricsCmd::RetainedMessageRemoved(1))
                            .await;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        log::error!("dispatcher: retained remove failed: {err:?}");
                    }
                }
            } else {
                match self.store_retained_with_retry(&message).await {
                    Ok(()) => {
                        self.retained_count += 1;
                        self.send_metrics(DispatcherToMetricsCmd::RetainedMessageAdded(1))
                            .await;
                    }
                    Err(err) => {
                        log::error!("dispatcher: retained store failed: {err:?}");
                    }
                }
            }
        }

        // 2. Archive fan-out; groups apply their own filters.
        if !broker_origin {
            if let Err(err) = self
                .archive_sender
                .send(DispatcherToArchiveCmd::Store(message.clone()))
                .await
            {
                log::error!("dispatcher: archive send failed: {err:?}");
            }
        }

        // 3. Subscriber resolution.
        let subscribers = self.subscriptions.matching_subscribers(message.topic());
        if subscribers.is_empty() {
            return;
        }

        // 4. + 5. Per-recipient transform and delivery.
        for (client_id, options) in subscribers {
            // The no-local option suppresses the echo to the publisher.
            if options.no_local && client_id == message.origin() {
                continue;
            }

            let effective_qos = message.qos().min(options.qos);
            // Without retain-as-published the forwarded copy loses its
            // retain flag.
            let retain = options.retain_as_published && message.retain();

            let publish = OutboundPublish {
                message: message.clone(),
                qos: effective_qos,
                retain,
            };
            self.deliver_to_client(&client_id, publish).await;
        }
    }

    /// Retained writes retry a transient storage failure with a short
    /// exponential backoff before the update is given up on.
    async fn store_retained_with_retry(
        &mut self,
        message: &crate::message::BrokerMessage,
    ) -> Result<(), crate::error::Error> {
        use rand::Rng;

        let mut delay = std::time::Duration::from_millis(20);
        let mut attempt = 0;
        loop {
            match self.retained_store.store(message).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < 2 => {
                    attempt += 1;
                    log::warn!(
                        "dispatcher: retained store failed (attempt {attempt}): {err:?}"
                    );
                    let jitter = rand::thread_rng().gen_range(0..10);
                    tokio::time::sleep(delay + std::time::Duration::from_millis(jitter)).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Deliver one transformed message to one subscriber: online local
    /// endpoints directly, offline persistent sessions into the store,
    /// remote sessions over the bus.
    pub(super) async fn deliver_to_client(&mut self, client_id: &str, publish: OutboundPublish) {
        if let Some(gid) = self.registry.online(client_id) {
            let payload_len = publish.message.payload().len();
            let cmd = DispatcherToListenerCmd::Publish(gid.session_id(), publish);
            match self.send_to_listener(gid.listener_id(), cmd).await {
                Ok(()) => {
                    self.send_metrics(DispatcherToMetricsCmd::PublishPacketSent(1, payload_len))
                        .await;
                }
                Err(err) => {
                    log::error!("dispatcher: delivery to {client_id} failed: {err:?}");
                }
            }
            return;
        }

        // A remote node owns the client: route the copy over the bus.
        if let Some(node) = self.coordinator.client_node(client_id) {
            if node != self.node_id {
                self.buffer_remote(&node, client_id, transformed_message(publish));
                return;
            }
        }

        // Offline: only QoS > 0 messages of persistent sessions queue up.
        if publish.qos == QoS::AtMostOnce || !self.registry.is_persistent(client_id) {
            self.send_metrics(DispatcherToMetricsCmd::PublishPacketDropped(
                1,
                publish.message.payload().len(),
            ))
            .await;
            return;
        }
        self.enqueue_offline(client_id, &transformed_message(publish))
            .await;
    }

    /// Write one message into a client's offline queue. An enqueue
    /// failure downgrades the delivery with a warning; the broker keeps
    /// serving.
    pub(super) async fn enqueue_offline(&mut self, client_id: &str, message: &BrokerMessage) {
        // A spent expiry may still be delivered immediately but must not
        // be queued any further.
        let now = now_ms();
        if message.is_expired(now) || message.outbound_expiry(now) == Some(0) {
            return;
        }

        match self
            .session_store
            .enqueue(client_id, message, self.maximum_queued_messages)
            .await
        {
            Ok(_sequence) => {
                self.queued_count += 1;
                self.send_metrics(DispatcherToMetricsCmd::MessagesQueued(1)).await;
            }
            Err(err) => {
                log::warn!(
                    "dispatcher: offline enqueue for {client_id} failed, message dropped: {err:?}"
                );
                self.send_metrics(DispatcherToMetricsCmd::PublishPacketDropped(
                    1,
                    message.payload().len(),
                ))
                .await;
            }
        }
    }

    /// Release up to `slots` queued messages towards a connected client,
    /// skipping entries whose expiry elapsed while queued.
    pub(super) async fn release_queued(&mut self, client_id: &str, slots: usize) {
        if slots == 0 || self.registry.online(client_id).is_none() {
            return;
        }

        let entries = match self.session_store.dequeue(client_id, slots).await {
            Ok(entries) => entries,
            Err(err) => {
                log::error!("dispatcher: dequeue for {client_id} failed: {err:?}");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        self.queued_count = self.queued_count.saturating_sub(entries.len() as u64);

        let now = now_ms();
        for entry in entries {
            // Expired entries are skipped and stay removed.
            if entry.message.is_expired(now) {
                continue;
            }
            let qos = entry.message.qos();
            let retain = entry.message.retain();
            self.deliver_to_client(
                client_id,
                OutboundPublish {
                    message: entry.message,
                    qos,
                    retain,
                },
            )
            .await;
        }
    }

    /// Stage a message for a client on another node; batches flush every
    /// few milliseconds as one bulk per destination.
    fn buffer_remote(&mut self, node: &str, client_id: &str, message: BrokerMessage) {
        self.remote_buffers
            .entry(node.to_string())
            .or_default()
            .entry(client_id.to_string())
            .or_default()
            .push(message);
    }

    pub(super) async fn flush_remote_buffers(&mut self) {
        if self.remote_buffers.is_empty() {
            return;
        }
        let buffers = std::mem::take(&mut self.remote_buffers);
        for (node, clients) in buffers {
            let address = crate::bus::client_delivery_address(&node);
            for (client_id, messages) in clients {
                let bulk = BulkClientMessage {
                    client_id,
                    messages,
                };
                if let Err(err) = self
                    .bus
                    .publish(&address, BusEvent::ClientMessages(bulk))
                    .await
                {
                    // The hop to an unreachable node degrades to at most
                    // once; persistent subscribers recover from their
                    // queue when the owning node is back.
                    log::warn!("dispatcher: bus publish to {node} failed: {err:?}");
                }
            }
        }
    }
}

/// Fold the per-recipient transform into the stored message, so queued
/// and remote copies carry their effective QoS and retain flag.
fn transformed_message(publish: OutboundPublish) -> BrokerMessage {
    let OutboundPublish {
        mut message,
        qos,
        retain,
    } = publish;
    let mut normalized = BrokerMessage::new(
        message.topic(),
        message.payload().clone(),
        qos,
        message.origin(),
        message.created_at(),
    );
    normalized.set_retain(retain);
    normalized.set_dup(message.dup());
    *normalized.properties_mut() = std::mem::take(message.properties_mut());
    normalized
}
