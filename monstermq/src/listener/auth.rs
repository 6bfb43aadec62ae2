// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Handles verdicts from the auth service.

use codec::v5::ReasonCode;
use codec::{QoS, TopicFilter};

use super::{ConnectedClient, Listener};
use crate::commands::{
    AuthToListenerCmd, ListenerToDispatcherCmd, ListenerToSessionCmd, SubscriptionRequest,
};
use crate::error::Error;
use crate::types::SessionGid;

impl Listener {
    pub(super) async fn handle_auth_cmd(&mut self, cmd: AuthToListenerCmd) -> Result<(), Error> {
        match cmd {
            AuthToListenerCmd::ResponseAuth(gid, reason) => {
                self.on_auth_response(gid, reason).await
            }
            AuthToListenerCmd::PublishChecked(gid, packet_id, message, allowed) => {
                self.on_publish_checked(gid, packet_id, message, allowed)
                    .await
            }
            AuthToListenerCmd::SubscribeChecked(gid, packet_id, verdicts) => {
                self.on_subscribe_checked(gid, packet_id, verdicts).await
            }
        }
    }

    async fn on_auth_response(
        &mut self,
        gid: SessionGid,
        reason: ReasonCode,
    ) -> Result<(), Error> {
        let session_id = gid.session_id();
        let Some(context) = self.connecting_sessions.remove(&session_id) else {
            return Err(Error::session_error(session_id));
        };

        if reason != ReasonCode::Success {
            log::info!(
                "listener {}: rejecting connect of {}: {reason:?}",
                self.id,
                context.client_id
            );
            return self
                .send_to_session(
                    session_id,
                    ListenerToSessionCmd::ConnectAck {
                        reason,
                        session_present: false,
                    },
                )
                .await;
        }

        self.connected_sessions.insert(
            session_id,
            ConnectedClient {
                client_id: context.client_id.clone(),
                username: context.username.clone(),
            },
        );
        self.client_ids
            .insert(context.client_id.clone(), session_id);

        // The dispatcher resumes or creates the stored session and
        // answers with the connect ack.
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionConnected {
                gid,
                client_id: context.client_id,
                clean_start: context.clean_start,
                session_expiry_interval: context.session_expiry_interval,
                receive_maximum: context.receive_maximum,
                maximum_packet_size: context.maximum_packet_size,
                topic_alias_maximum: context.topic_alias_maximum,
                will: context.will,
            })
            .await
            .map(drop)
            .map_err(Into::into)
    }

    async fn on_publish_checked(
        &mut self,
        gid: SessionGid,
        packet_id: codec::PacketId,
        message: crate::message::BrokerMessage,
        allowed: bool,
    ) -> Result<(), Error> {
        let session_id = gid.session_id();
        let qos = message.qos();

        if allowed {
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::Publish(gid, message))
                .await?;
        } else {
            log::info!(
                "listener {}: publish to {} denied by acl",
                self.id,
                message.topic()
            );
        }

        // QoS 0 needs no acknowledgement and, when permitted, no
        // rejection notice either.
        if qos == QoS::AtMostOnce && allowed {
            return Ok(());
        }

        self.send_to_session(
            session_id,
            ListenerToSessionCmd::PublishResult {
                packet_id,
                qos,
                accepted: allowed,
                disconnect: !allowed && self.disconnect_on_unauthorized_publish,
            },
        )
        .await
    }

    async fn on_subscribe_checked(
        &mut self,
        gid: SessionGid,
        packet_id: codec::PacketId,
        verdicts: Vec<(SubscriptionRequest, bool)>,
    ) -> Result<(), Error> {
        let session_id = gid.session_id();
        let Some(client) = self.connected_sessions.get(&session_id) else {
            return Err(Error::session_error(session_id));
        };
        let client_id = client.client_id.clone();

        // SUBACK reason codes keep the request order [MQTT-3.9.3-1].
        // A filter with broken wildcard syntax fails on its own with
        // topic-filter-invalid; the remaining filters are still granted.
        let reasons = verdicts
            .iter()
            .map(|(request, allowed)| {
                if TopicFilter::parse(&request.filter).is_err() {
                    ReasonCode::TopicFilterInvalid
                } else if !allowed {
                    ReasonCode::NotAuthorized
                } else {
                    match request.qos {
                        QoS::AtMostOnce => ReasonCode::Success,
                        QoS::AtLeastOnce => ReasonCode::GrantedQoS1,
                        QoS::ExactOnce => ReasonCode::GrantedQoS2,
                    }
                }
            })
            .collect();

        let granted: Vec<SubscriptionRequest> = verdicts
            .into_iter()
            .filter_map(|(request, allowed)| {
                (allowed && TopicFilter::parse(&request.filter).is_ok()).then_some(request)
            })
            .collect();

        self.send_to_session(
            session_id,
            ListenerToSessionCmd::SubscribeAck(packet_id, reasons),
        )
        .await?;

        if !granted.is_empty() {
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::Subscribe(gid, client_id, granted))
                .await?;
        }
        Ok(())
    }
}
