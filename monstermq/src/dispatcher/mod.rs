// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Dispatcher: the process wide message router.
//!
//! Owns the subscription manager, the retained and session stores, the
//! pending will messages and the purge schedule. Messages of remote
//! subscribers leave through the bus; everything else reaches local
//! endpoints via their listeners.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::interval;

use crate::bus::{Bus, BusEvent, LocalBus};
use crate::cluster::CoordinatorHandle;
use crate::commands::{
    ArchiveToDispatcherCmd, DispatcherToArchiveCmd, DispatcherToListenerCmd,
    DispatcherToMetricsCmd, ListenerToDispatcherCmd, MetricsToDispatcherCmd,
};
use crate::error::Error;
use crate::message::BrokerMessage;
use crate::metrics::BrokerCounters;
use crate::scheduler::{SchedulerHandle, TimerEvent, TimerId};
use crate::store::{RetainedBackend, SessionBackend, SessionStore};
use crate::types::{now_ms, ClientId, ListenerId, NodeId};

mod listener;
mod publish;
mod retained;
mod sessions;
mod subscriptions;
mod trie;

pub use subscriptions::{SubscriptionManager, SubscriptionOptions};
pub use trie::TopicIndex;

use sessions::SessionRegistry;

/// Flush cadence of the per-destination remote buffers.
const BULK_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Lock guarding the cluster wide expired-message purge.
const PURGE_LOCK: &str = "session-purge";

#[derive(Debug)]
struct PendingWill {
    message: BrokerMessage,
    delay_interval: u32,
    timer: Option<TimerId>,
}

pub struct Dispatcher {
    node_id: NodeId,

    subscriptions: SubscriptionManager,
    registry: SessionRegistry,

    session_store: SessionBackend,
    retained_store: RetainedBackend,

    coordinator: CoordinatorHandle,
    bus: LocalBus,
    scheduler: SchedulerHandle,
    timer_receiver: Receiver<TimerEvent>,

    /// Will messages of connected clients, published on ungraceful
    /// disconnect after their delay.
    pending_wills: HashMap<ClientId, PendingWill>,

    /// Outbound batches towards other nodes, flushed every few
    /// milliseconds.
    remote_buffers: HashMap<NodeId, HashMap<ClientId, Vec<BrokerMessage>>>,

    maximum_queued_messages: usize,
    purge_interval: Duration,

    /// Gauges answered over the bus for metrics aggregation.
    retained_count: u64,
    queued_count: u64,

    listener_senders: HashMap<ListenerId, Sender<DispatcherToListenerCmd>>,
    listener_receiver: Receiver<ListenerToDispatcherCmd>,

    archive_sender: Sender<DispatcherToArchiveCmd>,
    archive_receiver: Receiver<ArchiveToDispatcherCmd>,

    metrics_sender: Sender<DispatcherToMetricsCmd>,
    metrics_receiver: Receiver<MetricsToDispatcherCmd>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        node_id: &str,
        session_store: SessionBackend,
        retained_store: RetainedBackend,
        coordinator: CoordinatorHandle,
        bus: LocalBus,
        scheduler: SchedulerHandle,
        timer_receiver: Receiver<TimerEvent>,
        maximum_queued_messages: usize,
        purge_interval: Duration,
        // listeners
        listener_senders: Vec<(ListenerId, Sender<DispatcherToListenerCmd>)>,
        listener_receiver: Receiver<ListenerToDispatcherCmd>,
        // archive module
        archive_sender: Sender<DispatcherToArchiveCmd>,
        archive_receiver: Receiver<ArchiveToDispatcherCmd>,
        // metrics module
        metrics_sender: Sender<DispatcherToMetricsCmd>,
        metrics_receiver: Receiver<MetricsToDispatcherCmd>,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            subscriptions: SubscriptionManager::new(),
            registry: SessionRegistry::new(),
            session_store,
            retained_store,
            coordinator,
            bus,
            scheduler,
            timer_receiver,
            pending_wills: HashMap::new(),
            remote_buffers: HashMap::new(),
            maximum_queued_messages,
            purge_interval,
            retained_count: 0,
            queued_count: 0,
            listener_senders: listener_senders.into_iter().collect(),
            listener_receiver,
            archive_sender,
            archive_receiver,
            metrics_sender,
            metrics_receiver,
        }
    }

    pub async fn run_loop(&mut self) -> ! {
        let mut client_events = self
            .bus
            .subscribe(&crate::bus::client_delivery_address(&self.node_id));
        let mut counter_events = self
            .bus
            .subscribe(&crate::bus::dispatcher_counters_address(&self.node_id));
        let mut purge_timer = interval(self.purge_interval);
        let mut bulk_timer = interval(BULK_FLUSH_INTERVAL);

        loop {
            tokio::select! {
                Some(cmd) = self.listener_receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("dispatcher: listener cmd failed: {err:?}");
                    }
                }
                Some(cmd) = self.metrics_receiver.recv() => {
                    match cmd {
                        MetricsToDispatcherCmd::Publish(message) => {
                            self.dispatch_message(message, true).await;
                        }
                    }
                }
                Some(cmd) = self.archive_receiver.recv() => {
                    match cmd {
                        ArchiveToDispatcherCmd::PurgeDone(group, removed) => {
                            log::info!("dispatcher: archive {group} purged {removed} rows");
                        }
                    }
                }
                Some(event) = self.timer_receiver.recv() => {
                    self.handle_timer_event(event).await;
                }
                Some(event) = client_events.recv() => {
                    self.handle_bus_event(event).await;
                }
                Some(event) = counter_events.recv() => {
                    self.handle_bus_event(event).await;
                }
                _ = purge_timer.tick() => {
                    self.purge_expired().await;
                }
                _ = bulk_timer.tick() => {
                    self.flush_remote_buffers().await;
                }
            }
        }
    }

    async fn handle_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::PublishWill(client_id) => {
                if let Some(will) = self.pending_wills.remove(&client_id) {
                    log::info!("dispatcher: publishing delayed will of {client_id}");
                    self.dispatch_message(will.message, true).await;
                }
            }
            TimerEvent::ExpireSession(client_id) => {
                self.drop_session_state(&client_id).await;
            }
        }
    }

    async fn handle_bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::ClientMessages(bulk) => {
                // Deliveries routed here from a peer node. Duplicates are
                // possible on that path and absorbed by packet id reuse
                // detection at the endpoints.
                for message in bulk.messages {
                    let qos = message.qos();
                    let retain = message.retain();
                    self.deliver_to_client(
                        &bulk.client_id,
                        crate::commands::OutboundPublish {
                            message,
                            qos,
                            retain,
                        },
                    )
                    .await;
                }
            }
            BusEvent::CountersRequest(reply) => {
                let counters = BrokerCounters {
                    sessions: self.registry.online_count() as u64,
                    subscriptions: self.subscriptions.len() as u64,
                    retained_messages: self.retained_count,
                    queued_messages: self.queued_count,
                    ..BrokerCounters::default()
                };
                if reply.send(counters).is_err() {
                    log::warn!("dispatcher: counters reply dropped");
                }
            }
        }
    }

    /// Background purge: expired queued messages and expired sessions.
    /// Runs under a cluster lock so one node per interval does the
    /// destructive part.
    async fn purge_expired(&mut self) {
        let Some(_guard) = self
            .coordinator
            .acquire_lock(PURGE_LOCK, Duration::from_secs(5))
            .await
        else {
            return;
        };

        let now = now_ms();
        match self.session_store.purge_expired_messages(now).await {
            Ok(removed) if removed > 0 => {
                log::info!("dispatcher: purged {removed} expired queued messages");
                self.queued_count = self.queued_count.saturating_sub(removed);
            }
            Ok(_) => {}
            Err(err) => log::error!("dispatcher: message purge failed: {err:?}"),
        }

        match self.session_store.expired_sessions(now).await {
            Ok(expired) => {
                for client_id in expired {
                    log::info!("dispatcher: session of {client_id} expired");
                    self.drop_session_state(&client_id).await;
                }
            }
            Err(err) => log::error!("dispatcher: session expiry scan failed: {err:?}"),
        }
    }

    /// Remove all broker state of a gone session.
    async fn drop_session_state(&mut self, client_id: &str) {
        let removed = self.subscriptions.remove_client(client_id);
        if removed > 0 {
            self.send_metrics(DispatcherToMetricsCmd::SubscriptionsRemoved(0, removed))
                .await;
        }
        self.registry.remove(client_id);
        self.pending_wills.remove(client_id);
        if let Err(err) = self.session_store.remove_session(client_id).await {
            log::error!("dispatcher: failed to remove session of {client_id}: {err:?}");
        }
    }

    pub(super) async fn send_metrics(&mut self, cmd: DispatcherToMetricsCmd) {
        if let Err(err) = self.metrics_sender.send(cmd).await {
            log::error!("dispatcher: metrics send failed: {err:?}");
        }
    }

    pub(super) async fn send_to_listener(
        &mut self,
        listener_id: ListenerId,
        cmd: DispatcherToListenerCmd,
    ) -> Result<(), Error> {
        let Some(sender) = self.listener_senders.get(&listener_id) else {
            return Err(Error::from_string(
                crate::error::ErrorKind::ChannelError,
                format!("dispatcher: unknown listener {listener_id}"),
            ));
        };
        sender.send(cmd).await.map(drop).map_err(Into::into)
    }
}
