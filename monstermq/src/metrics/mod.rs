// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Metrics collection.
//!
//! Counter updates arrive as commands from the dispatcher; every
//! aggregation interval one elected node per metric kind snapshots the
//! counters over the bus, persists a [`BrokerMetrics`] record and resets.
//! It also publishes the `$SYS/uptime` gauge.

use bytes::Bytes;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::interval;

use crate::bus::{Bus, LocalBus};
use crate::cluster::CoordinatorHandle;
use crate::commands::{
    DispatcherToMetricsCmd, MetricsToDispatcherCmd, ServerContextToMetricsCmd,
};
use crate::error::Error;
use crate::message::BrokerMessage;
use crate::store::{MetricsBackend, MetricsStore};
use crate::types::{now_ms, NodeId, Uptime};
use codec::QoS;

pub const UPTIME_TOPIC: &str = "$SYS/uptime";

/// Metric kind tag of the periodic broker record.
pub const KIND_BROKER: &str = "broker";

/// Per-interval counters of the message plane.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BrokerCounters {
    pub sessions: u64,
    pub subscriptions: u64,
    pub retained_messages: u64,
    pub queued_messages: u64,
    pub publish_received: u64,
    pub publish_sent: u64,
    pub publish_dropped: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// One persisted aggregation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMetrics {
    pub node_id: NodeId,
    pub kind: String,
    pub timestamp: u64,
    pub counters: BrokerCounters,
}

/// Metrics service actor.
pub struct Metrics {
    node_id: NodeId,
    startup: SystemTime,
    uptime: Uptime,
    sys_interval: Duration,
    aggregate_interval: Duration,

    counters: BrokerCounters,

    store: MetricsBackend,
    bus: LocalBus,
    coordinator: CoordinatorHandle,

    dispatcher_sender: Sender<MetricsToDispatcherCmd>,
    dispatcher_receiver: Receiver<DispatcherToMetricsCmd>,

    server_ctx_receiver: Receiver<ServerContextToMetricsCmd>,
}

impl Metrics {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        node_id: &str,
        sys_interval: Duration,
        aggregate_interval: Duration,
        store: MetricsBackend,
        bus: LocalBus,
        coordinator: CoordinatorHandle,
        // dispatcher module
        dispatcher_sender: Sender<MetricsToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToMetricsCmd>,
        // server ctx module
        server_ctx_receiver: Receiver<ServerContextToMetricsCmd>,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            startup: SystemTime::now(),
            uptime: 0,
            sys_interval,
            aggregate_interval,
            counters: BrokerCounters::default(),
            store,
            bus,
            coordinator,
            dispatcher_sender,
            dispatcher_receiver,
            server_ctx_receiver,
        }
    }

    pub async fn run_loop(&mut self) -> ! {
        let mut uptime_timer = interval(Duration::from_secs(1));
        let mut sys_timer = interval(self.sys_interval);
        let mut aggregate_timer = interval(self.aggregate_interval);

        loop {
            tokio::select! {
                Some(cmd) = self.dispatcher_receiver.recv() => {
                    self.handle_dispatcher_cmd(cmd);
                }
                Some(cmd) = self.server_ctx_receiver.recv() => {
                    self.handle_server_ctx_cmd(cmd);
                }
                _ = uptime_timer.tick() => {
                    self.update_uptime();
                }
                _ = sys_timer.tick() => {
                    if let Err(err) = self.send_uptime().await {
                        log::error!("metrics: failed to publish uptime: {err:?}");
                    }
                }
                _ = aggregate_timer.tick() => {
                    self.aggregate().await;
                }
            }
        }
    }

    fn handle_dispatcher_cmd(&mut self, cmd: DispatcherToMetricsCmd) {
        match cmd {
            DispatcherToMetricsCmd::SessionAdded(listener_id) => {
                log::debug!("metrics: session added on listener {listener_id}");
                self.counters.sessions += 1;
            }
            DispatcherToMetricsCmd::SessionRemoved(listener_id) => {
                log::debug!("metrics: session removed on listener {listener_id}");
                self.counters.sessions = self.counters.sessions.saturating_sub(1);
            }
            DispatcherToMetricsCmd::SubscriptionsAdded(_listener_id, count) => {
                self.counters.subscriptions += count as u64;
            }
            DispatcherToMetricsCmd::SubscriptionsRemoved(_listener_id, count) => {
                self.counters.subscriptions = self.counters.subscriptions.saturating_sub(count as u64);
            }
            DispatcherToMetricsCmd::RetainedMessageAdded(count) => {
                self.counters.retained_messages += count as u64;
            }
            DispatcherToMetricsCmd::RetainedMessageRemoved(count) => {
                self.counters.retained_messages =
                    self.counters.retained_messages.saturating_sub(count as u64);
            }
            DispatcherToMetricsCmd::PublishPacketReceived(count, bytes) => {
                self.counters.publish_received += count as u64;
                self.counters.bytes_received += bytes as u64;
            }
            DispatcherToMetricsCmd::PublishPacketSent(count, bytes) => {
                self.counters.publish_sent += count as u64;
                self.counters.bytes_sent += bytes as u64;
            }
            DispatcherToMetricsCmd::PublishPacketDropped(count, bytes) => {
                log::debug!("metrics: {count} publishes dropped ({bytes} bytes)");
                self.counters.publish_dropped += count as u64;
            }
            DispatcherToMetricsCmd::MessagesQueued(count) => {
                self.counters.queued_messages += count as u64;
            }
        }
    }

    fn handle_server_ctx_cmd(&mut self, cmd: ServerContextToMetricsCmd) {
        match cmd {
            ServerContextToMetricsCmd::GetUptime(resp_tx) => {
                if resp_tx.send(self.uptime).is_err() {
                    log::error!("metrics: failed to send uptime to server ctx");
                }
            }
        }
    }

    fn update_uptime(&mut self) {
        match SystemTime::now().duration_since(self.startup) {
            Ok(duration) => self.uptime = duration.as_secs(),
            Err(err) => log::error!("metrics: failed to update uptime: {err}"),
        }
    }

    async fn send_uptime(&mut self) -> Result<(), Error> {
        let payload = Bytes::from(self.uptime.to_string());
        let message = BrokerMessage::new(UPTIME_TOPIC, payload, QoS::AtMostOnce, "", now_ms());
        self.dispatcher_sender
            .send(MetricsToDispatcherCmd::Publish(message))
            .await
            .map(drop)
            .map_err(Into::into)
    }

    /// Leader-elected aggregation: snapshot the subsystem counters over
    /// the bus, persist one record, reset the interval counters.
    async fn aggregate(&mut self) {
        let lock_name = format!("metrics-{KIND_BROKER}");
        let Some(_guard) = self
            .coordinator
            .acquire_lock(&lock_name, Duration::from_secs(5))
            .await
        else {
            // Another node aggregates this interval.
            return;
        };

        // The dispatcher gauge endpoint answers over the bus; on timeout
        // its gauges count as zero for this interval.
        let address = crate::bus::dispatcher_counters_address(&self.node_id);
        let gauges = match self
            .bus
            .request_counters(&address, Duration::from_secs(5))
            .await
        {
            Ok(counters) => counters,
            Err(err) => {
                log::warn!("metrics: counter request failed, recording zeros: {err:?}");
                BrokerCounters::default()
            }
        };

        let mut counters = std::mem::take(&mut self.counters);
        // Only the traffic counters reset per interval; the gauge fields
        // keep tracking current totals.
        self.counters.sessions = counters.sessions;
        self.counters.subscriptions = counters.subscriptions;
        self.counters.retained_messages = counters.retained_messages;
        self.counters.queued_messages = counters.queued_messages;

        // Gauges in the persisted record come from the authoritative
        // dispatcher snapshot.
        counters.sessions = gauges.sessions;
        counters.subscriptions = gauges.subscriptions;
        counters.retained_messages = gauges.retained_messages;
        counters.queued_messages = gauges.queued_messages;

        let record = BrokerMetrics {
            node_id: self.node_id.clone(),
            kind: KIND_BROKER.to_string(),
            timestamp: now_ms(),
            counters,
        };
        if let Err(err) = self.store.append(&record).await {
            log::error!("metrics: failed to persist record: {err:?}");
        }
    }
}
