// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Handles commands from the listeners: session lifecycle, subscription
//! changes and inbound publishes.

use codec::v5::ReasonCode;

use super::Dispatcher;
use crate::commands::{
    DispatcherToListenerCmd, DispatcherToMetricsCmd, ListenerToDispatcherCmd, SubscriptionRequest,
    WillMessage,
};
use crate::error::Error;
use crate::message::BrokerMessage;
use crate::scheduler::TimerEvent;
use crate::store::{SessionStore, StoredSession, StoredSubscription};
use crate::types::{now_ms, ClientId, SessionGid};

impl Dispatcher {
    pub(super) async fn handle_listener_cmd(
        &mut self,
        cmd: ListenerToDispatcherCmd,
    ) -> Result<(), Error> {
        match cmd {
            ListenerToDispatcherCmd::SessionConnected {
                gid,
                client_id,
                clean_start,
                session_expiry_interval,
                receive_maximum,
                maximum_packet_size,
                topic_alias_maximum,
                will,
            } => {
                self.on_session_connected(
                    gid,
                    client_id,
                    clean_start,
                    session_expiry_interval,
                    receive_maximum,
                    maximum_packet_size,
                    topic_alias_maximum,
                    will,
                )
                .await
            }
            ListenerToDispatcherCmd::Publish(gid, message) => {
                self.on_listener_publish(gid, message).await;
                Ok(())
            }
            ListenerToDispatcherCmd::Subscribe(gid, client_id, requests) => {
                self.on_listener_subscribe(gid, &client_id, requests).await
            }
            ListenerToDispatcherCmd::Unsubscribe(gid, client_id, packet_id, filters) => {
                self.on_listener_unsubscribe(gid, &client_id, packet_id, filters)
                    .await
            }
            ListenerToDispatcherCmd::SessionDisconnected {
                gid,
                client_id,
                publish_will,
                requeue,
            } => {
                self.on_session_disconnected(gid, &client_id, publish_will, requeue)
                    .await
            }
            ListenerToDispatcherCmd::WindowOpened(_gid, client_id, slots) => {
                self.release_queued(&client_id, slots).await;
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_session_connected(
        &mut self,
        gid: SessionGid,
        client_id: ClientId,
        clean_start: bool,
        session_expiry_interval: u32,
        receive_maximum: u16,
        maximum_packet_size: u32,
        topic_alias_maximum: u16,
        will: Option<WillMessage>,
    ) -> Result<(), Error> {
        // If this client id is already connected, the new connection
        // takes the session over and the old one is closed.
        if let Some(old_gid) = self.registry.online(&client_id) {
            if old_gid != gid {
                log::info!("dispatcher: session takeover of {client_id}");
                let cmd = DispatcherToListenerCmd::Disconnect(
                    old_gid.session_id(),
                    ReasonCode::SessionTakenOver,
                );
                if let Err(err) = self.send_to_listener(old_gid.listener_id(), cmd).await {
                    log::error!("dispatcher: takeover disconnect failed: {err:?}");
                }
            }
        }

        // A reconnect cancels a pending will delivery.
        if let Some(pending) = self.pending_wills.remove(&client_id) {
            if let Some(timer) = pending.timer {
                self.scheduler.cancel(timer);
            }
        }

        let stored = match self.session_store.load_session(&client_id).await {
            Ok(stored) => stored,
            Err(err) => {
                log::error!("dispatcher: session load of {client_id} failed: {err:?}");
                None
            }
        };
        let session_present =
            !clean_start && stored.as_ref().is_some_and(|s| !s.is_expired(now_ms()));

        if session_present {
            // Resume: install the stored subscriptions.
            match self.session_store.subscriptions(&client_id).await {
                Ok(stored_subs) => {
                    for sub in stored_subs {
                        self.subscriptions
                            .subscribe(&client_id, &subscription_from_stored(&sub));
                    }
                }
                Err(err) => {
                    log::error!(
                        "dispatcher: subscription load of {client_id} failed: {err:?}"
                    );
                }
            }
        } else {
            // Fresh session: any previous state is gone.
            self.subscriptions.remove_client(&client_id);
            if let Err(err) = self.session_store.remove_session(&client_id).await {
                log::error!("dispatcher: session reset of {client_id} failed: {err:?}");
            }
        }

        let record = StoredSession {
            client_id: client_id.clone(),
            clean_start,
            session_expiry_interval,
            receive_maximum,
            maximum_packet_size,
            topic_alias_maximum,
            connected: true,
            node_id: self.node_id.clone(),
            disconnected_at: 0,
        };
        if let Err(err) = self.session_store.save_session(&record).await {
            log::error!("dispatcher: session save of {client_id} failed: {err:?}");
        }

        // A session with a non-zero expiry survives the disconnect; 3.1.1
        // clients with clean session 0 arrive here with the no-expiry
        // sentinel already set.
        let persistent = session_expiry_interval > 0;
        self.registry.set_online(&client_id, gid, persistent);
        self.coordinator.set_client_node(&client_id, &self.node_id);
        if let Some(will) = will {
            self.pending_wills.insert(
                client_id.clone(),
                super::PendingWill {
                    message: will.message,
                    delay_interval: will.delay_interval,
                    timer: None,
                },
            );
        }
        self.send_metrics(DispatcherToMetricsCmd::SessionAdded(gid.listener_id()))
            .await;

        self.send_to_listener(
            gid.listener_id(),
            DispatcherToListenerCmd::ConnectAck {
                session_id: gid.session_id(),
                reason: ReasonCode::Success,
                session_present,
            },
        )
        .await?;

        // Resumed sessions drain their offline queue right away, within
        // the client's receive window.
        if session_present {
            self.release_queued(&client_id, usize::from(receive_maximum))
                .await;
        }
        Ok(())
    }

    async fn on_listener_subscribe(
        &mut self,
        gid: SessionGid,
        client_id: &str,
        requests: Vec<SubscriptionRequest>,
    ) -> Result<(), Error> {
        let mut added = 0;
        for request in requests {
            // Retain handling "send only if new" looks at the state
            // before this subscribe.
            let existed = self.subscriptions.has_subscription(client_id, &request.filter);
            let replaced = self.subscriptions.subscribe(client_id, &request);
            if !replaced {
                added += 1;
            }

            if self.registry.is_persistent(client_id) {
                let stored = stored_from_subscription(client_id, &request);
                if let Err(err) = self.session_store.save_subscription(&stored).await {
                    log::error!(
                        "dispatcher: failed to persist subscription of {client_id}: {err:?}"
                    );
                }
            }

            self.deliver_retained(gid, client_id, &request, existed).await;
        }

        if added > 0 {
            self.send_metrics(DispatcherToMetricsCmd::SubscriptionsAdded(
                gid.listener_id(),
                added,
            ))
            .await;
        }
        Ok(())
    }

    async fn on_listener_unsubscribe(
        &mut self,
        gid: SessionGid,
        client_id: &str,
        packet_id: codec::PacketId,
        filters: Vec<String>,
    ) -> Result<(), Error> {
        let mut reasons = Vec::with_capacity(filters.len());
        let mut removed = 0;
        for filter in &filters {
            let existed = self.subscriptions.unsubscribe(client_id, filter);
            if existed {
                removed += 1;
                reasons.push(ReasonCode::Success);
            } else {
                reasons.push(ReasonCode::NoSubscriptionExisted);
            }
            if let Err(err) = self
                .session_store
                .remove_subscription(client_id, filter)
                .await
            {
                log::error!(
                    "dispatcher: failed to remove stored subscription of {client_id}: {err:?}"
                );
            }
        }

        if removed > 0 {
            self.send_metrics(DispatcherToMetricsCmd::SubscriptionsRemoved(
                gid.listener_id(),
                removed,
            ))
            .await;
        }

        self.send_to_listener(
            gid.listener_id(),
            DispatcherToListenerCmd::UnsubscribeAck(gid.session_id(), packet_id, reasons),
        )
        .await
    }

    async fn on_session_disconnected(
        &mut self,
        gid: SessionGid,
        client_id: &str,
        publish_will: bool,
        requeue: Vec<BrokerMessage>,
    ) -> Result<(), Error> {
        // Stale disconnects of taken-over sessions change nothing.
        if !self.registry.set_offline(client_id, gid) {
            return Ok(());
        }
        self.coordinator.remove_client_node(client_id, &self.node_id);
        self.send_metrics(DispatcherToMetricsCmd::SessionRemoved(gid.listener_id()))
            .await;

        let will = self.pending_wills.remove(client_id);
        if publish_will {
            if let Some(will) = will {
                self.schedule_will(client_id, will).await;
            }
        }

        if self.registry.is_persistent(client_id) {
            let now = now_ms();
            if let Ok(Some(mut stored)) = self.session_store.load_session(client_id).await {
                stored.connected = false;
                stored.disconnected_at = now;
                if let Err(err) = self.session_store.save_session(&stored).await {
                    log::error!("dispatcher: session save of {client_id} failed: {err:?}");
                }
            }
            // Undelivered messages of the dead connection go back into
            // the offline queue, unless their expiry is already spent.
            for message in requeue {
                if message.outbound_expiry(now) == Some(0) || message.is_expired(now) {
                    continue;
                }
                self.enqueue_offline(client_id, &message).await;
            }
        } else {
            self.drop_session_state(client_id).await;
        }
        Ok(())
    }

    async fn schedule_will(&mut self, client_id: &str, mut will: super::PendingWill) {
        if will.delay_interval == 0 {
            log::info!("dispatcher: publishing will of {client_id}");
            self.dispatch_message(will.message, true).await;
            return;
        }
        // Delayed will: fire after the interval unless the client comes
        // back first.
        let timer = self.scheduler.schedule(
            std::time::Duration::from_secs(u64::from(will.delay_interval)),
            TimerEvent::PublishWill(client_id.to_string()),
        );
        will.timer = Some(timer);
        self.pending_wills.insert(client_id.to_string(), will);
    }
}

fn subscription_from_stored(stored: &StoredSubscription) -> SubscriptionRequest {
    use codec::v5::RetainHandling;
    use std::convert::TryFrom;

    SubscriptionRequest {
        filter: stored.filter.clone(),
        qos: codec::QoS::try_from(stored.qos).unwrap_or(codec::QoS::AtMostOnce),
        no_local: stored.no_local,
        retain_as_published: stored.retain_as_published,
        retain_handling: RetainHandling::try_from(stored.retain_handling)
            .unwrap_or(RetainHandling::Send),
    }
}

fn stored_from_subscription(client_id: &str, request: &SubscriptionRequest) -> StoredSubscription {
    StoredSubscription {
        client_id: client_id.to_string(),
        filter: request.filter.clone(),
        qos: request.qos as u8,
        no_local: request.no_local,
        retain_as_published: request.retain_as_published,
        retain_handling: request.retain_handling as u8,
    }
}
