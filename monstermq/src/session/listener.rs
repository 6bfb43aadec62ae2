// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Handles commands from the listener: connect results, outbound
//! deliveries and acknowledgements.

use codec::{v3, v5, PacketId, ProtocolLevel, QoS};

use super::flow::PushOutcome;
use super::{Session, Status};
use crate::commands::{ListenerToSessionCmd, OutboundPublish, SessionToListenerCmd};
use crate::error::Error;
use crate::types::now_ms;

impl Session {
    pub(super) async fn handle_listener_cmd(
        &mut self,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        match cmd {
            ListenerToSessionCmd::ConnectAck {
                reason,
                session_present,
            } => self.on_listener_connect_ack(reason, session_present).await,
            ListenerToSessionCmd::Publish(publish) => self.deliver_publish(publish).await,
            ListenerToSessionCmd::PublishResult {
                packet_id,
                qos,
                accepted,
                disconnect,
            } => {
                self.on_listener_publish_result(packet_id, qos, accepted, disconnect)
                    .await
            }
            ListenerToSessionCmd::SubscribeAck(packet_id, reasons) => {
                self.on_listener_subscribe_ack(packet_id, &reasons).await
            }
            ListenerToSessionCmd::UnsubscribeAck(packet_id, reasons) => {
                self.on_listener_unsubscribe_ack(packet_id, reasons).await
            }
            ListenerToSessionCmd::Disconnect(reason) => {
                self.close_with_reason(reason).await;
                Ok(())
            }
        }
    }

    fn v3_return_code(reason: v5::ReasonCode) -> v3::ConnectReturnCode {
        match reason {
            v5::ReasonCode::Success => v3::ConnectReturnCode::Accepted,
            v5::ReasonCode::BadUserNameOrPassword => v3::ConnectReturnCode::BadUserNameOrPassword,
            v5::ReasonCode::NotAuthorized | v5::ReasonCode::Banned => {
                v3::ConnectReturnCode::NotAuthorized
            }
            v5::ReasonCode::ClientIdentifierNotValid => v3::ConnectReturnCode::IdentifierRejected,
            _ => v3::ConnectReturnCode::ServerUnavailable,
        }
    }

    async fn on_listener_connect_ack(
        &mut self,
        reason: v5::ReasonCode,
        session_present: bool,
    ) -> Result<(), Error> {
        if reason == v5::ReasonCode::Success {
            self.status = Status::Connected;
            self.auth_exchange = None;
            if self.protocol_level == ProtocolLevel::V5 {
                let assigned = self
                    .assigned_client_id
                    .then(|| self.client_id.clone());
                let ack = self.build_connack_v5(
                    session_present,
                    self.session_expiry_interval,
                    assigned.as_deref(),
                );
                self.send(ack).await
            } else {
                let ack =
                    v3::ConnectAckPacket::new(session_present, v3::ConnectReturnCode::Accepted);
                self.send(ack).await
            }
        } else {
            // A failed CONNACK never reports a present session and the
            // connection closes right after it.
            if self.protocol_level == ProtocolLevel::V5 {
                self.send(v5::ConnectAckPacket::new(false, reason)).await?;
            } else {
                self.send(v3::ConnectAckPacket::new(false, Self::v3_return_code(reason)))
                    .await?;
            }
            self.status = Status::Closed;
            Ok(())
        }
    }

    /// Deliver one message to this client, subject to the flow control
    /// window and message expiry.
    pub(super) async fn deliver_publish(&mut self, publish: OutboundPublish) -> Result<(), Error> {
        let now = now_ms();
        if publish.message.is_expired(now) {
            log::debug!(
                "session {}: dropping expired message for {}",
                self.id,
                publish.message.topic()
            );
            return Ok(());
        }

        if publish.qos == QoS::AtMostOnce {
            return self.send_publish_packet(PacketId::new(0), &publish, now).await;
        }

        match self.window.push(publish) {
            PushOutcome::Started(packet_id) => {
                let Some(publish) = self.window.get(packet_id).cloned() else {
                    return Ok(());
                };
                self.send_publish_packet(packet_id, &publish, now).await
            }
            PushOutcome::Queued => Ok(()),
            PushOutcome::Dropped => {
                log::warn!(
                    "session {}: pending queue full, dropping message",
                    self.id
                );
                Ok(())
            }
        }
    }

    async fn send_publish_packet(
        &mut self,
        packet_id: PacketId,
        publish: &OutboundPublish,
        now: u64,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let packet =
                publish
                    .message
                    .to_v5_publish(packet_id, publish.qos, publish.retain, now)?;
            self.send(packet).await
        } else {
            let packet = publish
                .message
                .to_v3_publish(packet_id, publish.qos, publish.retain)?;
            self.send(packet).await
        }
    }

    /// A freed window slot first serves the local pending queue, then
    /// pulls queued messages from the session store.
    pub(super) async fn after_slot_freed(&mut self) -> Result<(), Error> {
        if let Some(next) = self.window.next_pending() {
            self.deliver_publish(next).await
        } else if self.window.has_room_for_stored() {
            self.sender
                .send(SessionToListenerCmd::WindowOpened(self.id, 1))
                .await
                .map(drop)?;
            Ok(())
        } else {
            Ok(())
        }
    }

    async fn on_listener_publish_result(
        &mut self,
        packet_id: PacketId,
        qos: QoS,
        accepted: bool,
        disconnect: bool,
    ) -> Result<(), Error> {
        if !accepted && disconnect {
            // Unauthorized publish with the disconnect policy: 5.0 peers
            // get DISCONNECT 0x87, 3.1.1 peers a socket close.
            self.pub_recv_packets.remove(&packet_id);
            self.close_with_reason(v5::ReasonCode::NotAuthorized).await;
            return Ok(());
        }

        // Without reason codes a 3.1.1 publish is dropped silently; the
        // flow is acknowledged as usual.
        let reason = if accepted || self.protocol_level != ProtocolLevel::V5 {
            v5::ReasonCode::Success
        } else {
            v5::ReasonCode::NotAuthorized
        };

        match qos {
            QoS::AtMostOnce => Ok(()),
            QoS::AtLeastOnce => {
                // The acknowledgement frees the receive window slot.
                self.inbound_in_flight = self.inbound_in_flight.saturating_sub(1);
                self.send_puback(packet_id, reason).await
            }
            QoS::ExactOnce => {
                if reason.is_error() {
                    // The flow ends here; the id is free again.
                    self.pub_recv_packets.remove(&packet_id);
                    self.inbound_in_flight = self.inbound_in_flight.saturating_sub(1);
                }
                self.send_pubrec(packet_id, reason).await
            }
        }
    }

    async fn on_listener_subscribe_ack(
        &mut self,
        packet_id: PacketId,
        reasons: &[v5::ReasonCode],
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::SubscribeAckPacket::with_vec(packet_id, reasons.to_vec());
            self.send(packet).await
        } else {
            let acks = reasons
                .iter()
                .map(|reason| match reason {
                    v5::ReasonCode::Success => v3::SubscribeAck::QoS(QoS::AtMostOnce),
                    v5::ReasonCode::GrantedQoS1 => v3::SubscribeAck::QoS(QoS::AtLeastOnce),
                    v5::ReasonCode::GrantedQoS2 => v3::SubscribeAck::QoS(QoS::ExactOnce),
                    _ => v3::SubscribeAck::Failed,
                })
                .collect();
            let packet = v3::SubscribeAckPacket::with_vec(packet_id, acks);
            self.send(packet).await
        }
    }

    async fn on_listener_unsubscribe_ack(
        &mut self,
        packet_id: PacketId,
        reasons: Vec<v5::ReasonCode>,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::UnsubscribeAckPacket::with_vec(packet_id, reasons);
            self.send(packet).await
        } else {
            // 3.1.1 unsubscribe acks carry no reason codes.
            self.send(v3::UnsubscribeAckPacket::new(packet_id)).await
        }
    }
}
