// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Handles client packets.

use codec::utils::random_client_id;
use codec::{
    v3, v5, ByteArray, DecodeError, DecodePacket, FixedHeader, PacketId, PacketType, ProtocolLevel,
    QoS, StringData,
};

use super::{Session, Status};
use crate::commands::{ConnectContext, SessionToListenerCmd, SubscriptionRequest, WillMessage};
use crate::error::{Error, ErrorKind};
use crate::message::BrokerMessage;
use crate::types::now_ms;

impl Session {
    pub(super) async fn handle_client_packet(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let fixed_header = FixedHeader::decode(&mut ba)?;

        match fixed_header.packet_type() {
            PacketType::Connect => self.on_client_connect(buf).await,
            PacketType::PingRequest => self.on_client_ping(buf).await,
            PacketType::Publish { .. } => self.on_client_publish(buf).await,
            PacketType::PublishAck => self.on_client_publish_ack(buf).await,
            PacketType::PublishReceived => self.on_client_publish_received(buf).await,
            PacketType::PublishRelease => self.on_client_publish_release(buf).await,
            PacketType::PublishComplete => self.on_client_publish_complete(buf).await,
            PacketType::Subscribe => self.on_client_subscribe(buf).await,
            PacketType::Unsubscribe => self.on_client_unsubscribe(buf).await,
            PacketType::Disconnect => self.on_client_disconnect(buf).await,
            PacketType::Auth => self.on_client_auth(buf).await,
            packet_type => {
                // ConnectAck, SubscribeAck, UnsubscribeAck and
                // PingResponse only flow server to client.
                log::error!(
                    "session {}: unexpected {packet_type:?} from client",
                    self.id
                );
                self.close_with_reason(v5::ReasonCode::ProtocolError).await;
                Err(Error::protocol(
                    v5::ReasonCode::ProtocolError,
                    "server-only packet received from client",
                ))
            }
        }
    }

    pub(super) async fn reject_client_id(&mut self) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let ack_packet =
                v5::ConnectAckPacket::new(false, v5::ReasonCode::ClientIdentifierNotValid);
            self.send(ack_packet).await?;
        } else {
            // If a server sends a CONNACK packet containing a non-zero
            // return code it MUST set Session Present to 0 [MQTT-3.2.2-4].
            let ack_packet =
                v3::ConnectAckPacket::new(false, v3::ConnectReturnCode::IdentifierRejected);
            self.send(ack_packet).await?;
        }
        self.status = Status::Closed;
        Ok(())
    }

    /// Read protocol name and level out of a connect packet without
    /// consuming it.
    fn peek_protocol_level(buf: &[u8]) -> Result<ProtocolLevel, DecodeError> {
        let mut ba = ByteArray::new(buf);
        let _fixed_header = FixedHeader::decode(&mut ba)?;
        let protocol_name = StringData::decode(&mut ba)?;
        if protocol_name.as_ref() != v3::PROTOCOL_NAME
            && protocol_name.as_ref() != v3::PROTOCOL_NAME_V31
        {
            return Err(DecodeError::InvalidProtocolName);
        }
        ProtocolLevel::decode(&mut ba)
    }

    async fn on_client_connect(&mut self, buf: &[u8]) -> Result<(), Error> {
        // The Server MUST process a second CONNECT packet sent from a
        // Client as a protocol violation and disconnect [MQTT-3.1.0-2].
        if self.status != Status::AwaitConnect {
            self.close_with_reason(v5::ReasonCode::ProtocolError).await;
            return Err(Error::protocol(
                v5::ReasonCode::ProtocolError,
                "second connect packet",
            ));
        }

        let protocol_level = match Self::peek_protocol_level(buf) {
            Ok(protocol_level) => protocol_level,
            Err(DecodeError::InvalidProtocolName | DecodeError::InvalidProtocolLevel) => {
                // The Server MUST respond with return code 0x01
                // (unacceptable protocol level) and then disconnect the
                // Client [MQTT-3.1.2-2].
                let ack_packet =
                    v3::ConnectAckPacket::new(false, v3::ConnectReturnCode::UnacceptedProtocol);
                self.send(ack_packet).await?;
                self.status = Status::Closed;
                return Err(Error::protocol(
                    v5::ReasonCode::UnsupportedProtocolVersion,
                    "unsupported protocol version",
                ));
            }
            Err(err) => {
                // Malformed connect: close without a CONNACK
                // [MQTT-3.1.4-1].
                self.status = Status::Closed;
                return Err(err.into());
            }
        };

        self.protocol_level = protocol_level;
        if protocol_level == ProtocolLevel::V5 {
            self.on_client_connect_v5(buf).await
        } else {
            self.on_client_connect_v3(buf).await
        }
    }

    async fn on_client_connect_v3(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let mut packet = match v3::ConnectPacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(DecodeError::InvalidClientId) => {
                self.reject_client_id().await?;
                return Err(DecodeError::InvalidClientId.into());
            }
            Err(err) => {
                self.status = Status::Closed;
                return Err(err.into());
            }
        };

        // A zero length client id gets a broker assigned one
        // [MQTT-3.1.3-6], when the listener permits it.
        if packet.client_id().is_empty() {
            if self.config.allow_empty_client_id() {
                self.assigned_client_id = true;
                let _ret = packet.set_client_id(&random_client_id());
            } else {
                return self.reject_client_id().await;
            }
        }
        self.client_id = packet.client_id().to_string();
        self.clean_session = packet.connect_flags().clean_session();
        self.negotiate_keep_alive(packet.keep_alive());
        // A 3.1.1 session with clean session 0 persists until the next
        // clean connect.
        self.session_expiry_interval = if self.clean_session { 0 } else { u32::MAX };
        // 3.1.1 has no receive maximum; the window runs at a fixed large
        // limit.
        self.window.set_capacity(u16::MAX);

        let will = if packet.connect_flags().will() {
            packet.will_topic().map(|topic| {
                let mut message = BrokerMessage::new(
                    topic.as_ref(),
                    bytes::Bytes::copy_from_slice(packet.will_message()),
                    packet.will_qos(),
                    packet.client_id(),
                    now_ms(),
                );
                message.set_retain(packet.connect_flags().will_retain());
                WillMessage {
                    message,
                    delay_interval: 0,
                }
            })
        } else {
            None
        };

        let context = ConnectContext {
            client_id: self.client_id.clone(),
            assigned_client_id: self.assigned_client_id,
            username: packet
                .connect_flags()
                .username()
                .then(|| packet.username().to_string()),
            password: packet.password().to_vec(),
            protocol: self.protocol_level,
            clean_start: self.clean_session,
            keep_alive: self.server_keep_alive,
            session_expiry_interval: self.session_expiry_interval,
            receive_maximum: u16::MAX,
            maximum_packet_size: codec::MAX_PACKET_LEN as u32,
            topic_alias_maximum: 0,
            will,
        };
        self.finish_connect(context).await
    }

    /// Clamp and install the keep alive negotiated with the client.
    pub(super) fn negotiate_keep_alive(&mut self, requested: u16) {
        let mut effective = if requested == 0 {
            u16::try_from(self.config.keep_alive()).unwrap_or(u16::MAX)
        } else {
            requested
        };
        let max_keepalive = self.config.max_keepalive();
        if max_keepalive > 0 && effective > max_keepalive {
            effective = max_keepalive;
        }
        self.server_keep_alive = effective;
        self.keep_alive_timeout = u64::from(effective) * 3 / 2;
    }

    /// Hand the normalized connect state to the listener and await the
    /// connect ack command.
    pub(super) async fn finish_connect(&mut self, context: ConnectContext) -> Result<(), Error> {
        self.status = Status::Authenticating;
        self.sender
            .send(SessionToListenerCmd::Connect(self.id, context))
            .await
            .map(drop)?;
        Ok(())
    }

    async fn on_client_ping(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let _packet = v3::PingRequestPacket::decode(&mut ba)?;
        self.send(v3::PingResponsePacket::new()).await
    }

    async fn on_client_publish(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.status != Status::Connected {
            self.close_with_reason(v5::ReasonCode::ProtocolError).await;
            return Err(Error::protocol(
                v5::ReasonCode::ProtocolError,
                "publish before connack",
            ));
        }
        if self.protocol_level == ProtocolLevel::V5 {
            return self.on_client_publish_v5(buf).await;
        }

        let mut ba = ByteArray::new(buf);
        let packet = v3::PublishPacket::decode(&mut ba)?;

        if self.publish_quota_exhausted(packet.qos(), packet.packet_id()) {
            return self
                .reject_publish_quota(packet.packet_id(), packet.qos())
                .await;
        }
        if !self
            .check_inbound_qos2(packet.qos(), packet.packet_id(), packet.dup())
            .await?
        {
            return Ok(());
        }

        let message = BrokerMessage::from_v3_publish(&packet, &self.client_id, now_ms());
        self.forward_publish(packet.packet_id(), message).await
    }

    /// True when a new QoS > 0 publish would exceed the receive maximum
    /// advertised in the CONNACK. Re-deliveries of tracked QoS 2 ids are
    /// exempt.
    pub(super) fn publish_quota_exhausted(&self, qos: QoS, packet_id: PacketId) -> bool {
        if qos == QoS::AtMostOnce || self.pub_recv_packets.contains(&packet_id) {
            return false;
        }
        self.inbound_in_flight >= usize::from(self.config.maximum_inflight_messages())
    }

    /// Backpressure: the publish is refused with quota-exceeded and the
    /// connection stays up. 3.1.1 peers have no reason codes; their flow
    /// is acknowledged as usual and the message dropped.
    pub(super) async fn reject_publish_quota(
        &mut self,
        packet_id: PacketId,
        qos: QoS,
    ) -> Result<(), Error> {
        log::warn!(
            "session {}: receive maximum reached, refusing publish {packet_id}",
            self.id
        );
        if self.protocol_level == ProtocolLevel::V5 {
            match qos {
                QoS::AtMostOnce => Ok(()),
                QoS::AtLeastOnce => {
                    self.send_puback(packet_id, v5::ReasonCode::QuotaExceeded)
                        .await
                }
                QoS::ExactOnce => {
                    self.send_pubrec(packet_id, v5::ReasonCode::QuotaExceeded)
                        .await
                }
            }
        } else {
            match qos {
                QoS::AtMostOnce => Ok(()),
                QoS::AtLeastOnce => self.send_puback(packet_id, v5::ReasonCode::Success).await,
                QoS::ExactOnce => {
                    // The id occupies the window until its release.
                    self.pub_recv_packets.insert(packet_id);
                    self.inbound_in_flight += 1;
                    self.send_pubrec(packet_id, v5::ReasonCode::Success).await
                }
            }
        }
    }

    /// Inbound QoS 2 duplicate tracking. Returns false when the packet
    /// was already received and answered again.
    pub(super) async fn check_inbound_qos2(
        &mut self,
        qos: QoS,
        packet_id: PacketId,
        dup: bool,
    ) -> Result<bool, Error> {
        if qos != QoS::ExactOnce {
            return Ok(true);
        }
        if self.pub_recv_packets.contains(&packet_id) {
            if dup {
                // Re-delivery of a known id: acknowledge again without
                // dispatching a second copy.
                self.send_pubrec(packet_id, v5::ReasonCode::Success).await?;
                return Ok(false);
            }
            // Packet id reuse before release is a protocol error.
            self.close_with_reason(v5::ReasonCode::ImplementationSpecificError)
                .await;
            return Err(Error::protocol(
                v5::ReasonCode::ImplementationSpecificError,
                "qos2 packet id reused before release",
            ));
        }
        self.pub_recv_packets.insert(packet_id);
        Ok(true)
    }

    /// Queue the normalized message towards the dispatcher; the verdict
    /// comes back as a `PublishResult` command.
    pub(super) async fn forward_publish(
        &mut self,
        packet_id: PacketId,
        message: BrokerMessage,
    ) -> Result<(), Error> {
        if message.qos() != QoS::AtMostOnce {
            self.inbound_in_flight += 1;
        }
        self.sender
            .send(SessionToListenerCmd::Publish(self.id, packet_id, message))
            .await
            .map(drop)?;
        Ok(())
    }

    pub(super) async fn send_pubrec(
        &mut self,
        packet_id: PacketId,
        reason: v5::ReasonCode,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(v5::PublishReceivedPacket::new(packet_id, reason))
                .await
        } else {
            self.send(v3::PublishReceivedPacket::new(packet_id)).await
        }
    }

    pub(super) async fn send_puback(
        &mut self,
        packet_id: PacketId,
        reason: v5::ReasonCode,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(v5::PublishAckPacket::new(packet_id, reason)).await
        } else {
            self.send(v3::PublishAckPacket::new(packet_id)).await
        }
    }

    /// PUBACK of one of our QoS 1 deliveries.
    async fn on_client_publish_ack(&mut self, buf: &[u8]) -> Result<(), Error> {
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            v5::PublishAckPacket::decode(&mut ba)?.packet_id()
        } else {
            let mut ba = ByteArray::new(buf);
            v3::PublishAckPacket::decode(&mut ba)?.packet_id()
        };

        if self.window.puback(packet_id) {
            self.after_slot_freed().await?;
        } else {
            log::warn!("session {}: puback for unknown id {packet_id}", self.id);
        }
        Ok(())
    }

    /// PUBREC of one of our QoS 2 deliveries; answer with PUBREL.
    async fn on_client_publish_received(&mut self, buf: &[u8]) -> Result<(), Error> {
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            v5::PublishReceivedPacket::decode(&mut ba)?.packet_id()
        } else {
            let mut ba = ByteArray::new(buf);
            v3::PublishReceivedPacket::decode(&mut ba)?.packet_id()
        };

        if self.window.pubrec(packet_id) {
            if self.protocol_level == ProtocolLevel::V5 {
                self.send(v5::PublishReleasePacket::new(
                    packet_id,
                    v5::ReasonCode::Success,
                ))
                .await
            } else {
                self.send(v3::PublishReleasePacket::new(packet_id)).await
            }
        } else {
            log::warn!("session {}: pubrec for unknown id {packet_id}", self.id);
            Ok(())
        }
    }

    /// PUBCOMP of one of our QoS 2 deliveries.
    async fn on_client_publish_complete(&mut self, buf: &[u8]) -> Result<(), Error> {
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            v5::PublishCompletePacket::decode(&mut ba)?.packet_id()
        } else {
            let mut ba = ByteArray::new(buf);
            v3::PublishCompletePacket::decode(&mut ba)?.packet_id()
        };

        if self.window.pubcomp(packet_id) {
            self.after_slot_freed().await?;
        } else {
            log::warn!("session {}: pubcomp for unknown id {packet_id}", self.id);
        }
        Ok(())
    }

    /// PUBREL of an inbound QoS 2 publish: release the stored packet id
    /// and complete the flow.
    async fn on_client_publish_release(&mut self, buf: &[u8]) -> Result<(), Error> {
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            v5::PublishReleasePacket::decode(&mut ba)?.packet_id()
        } else {
            let mut ba = ByteArray::new(buf);
            v3::PublishReleasePacket::decode(&mut ba)?.packet_id()
        };

        if self.pub_recv_packets.remove(&packet_id) {
            self.inbound_in_flight = self.inbound_in_flight.saturating_sub(1);
            if self.protocol_level == ProtocolLevel::V5 {
                self.send(v5::PublishCompletePacket::new(
                    packet_id,
                    v5::ReasonCode::Success,
                ))
                .await
            } else {
                self.send(v3::PublishCompletePacket::new(packet_id)).await
            }
        } else if self.protocol_level == ProtocolLevel::V5 {
            self.send(v5::PublishCompletePacket::new(
                packet_id,
                v5::ReasonCode::PacketIdentifierNotFound,
            ))
            .await
        } else {
            log::error!(
                "session {}: pubrel for unknown id {packet_id}",
                self.id
            );
            Ok(())
        }
    }

    async fn on_client_subscribe(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.status != Status::Connected {
            self.close_with_reason(v5::ReasonCode::ProtocolError).await;
            return Err(Error::protocol(
                v5::ReasonCode::ProtocolError,
                "subscribe before connack",
            ));
        }
        if self.protocol_level == ProtocolLevel::V5 {
            return self.on_client_subscribe_v5(buf).await;
        }

        let mut ba = ByteArray::new(buf);
        let packet = match v3::SubscribePacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
                // A subscribe packet with no filters, reserved QoS bits or
                // malformed flags is a protocol violation [MQTT-3.8.3-3],
                // [MQTT-3-8.3-4]; the connection closes.
                self.close_with_reason(v5::ReasonCode::MalformedPacket).await;
                return Err(err.into());
            }
        };

        let requests = packet
            .topics()
            .iter()
            .map(|topic| SubscriptionRequest {
                filter: topic.topic().to_string(),
                qos: topic.qos(),
                no_local: false,
                retain_as_published: false,
                retain_handling: v5::RetainHandling::Send,
            })
            .collect();
        self.sender
            .send(SessionToListenerCmd::Subscribe(
                self.id,
                packet.packet_id(),
                requests,
            ))
            .await
            .map(drop)?;
        Ok(())
    }

    async fn on_client_unsubscribe(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.status != Status::Connected {
            self.close_with_reason(v5::ReasonCode::ProtocolError).await;
            return Err(Error::protocol(
                v5::ReasonCode::ProtocolError,
                "unsubscribe before connack",
            ));
        }
        if self.protocol_level == ProtocolLevel::V5 {
            return self.on_client_unsubscribe_v5(buf).await;
        }

        let mut ba = ByteArray::new(buf);
        let packet = v3::UnsubscribePacket::decode(&mut ba)?;
        let filters = packet
            .topics()
            .iter()
            .map(|topic| topic.as_ref().to_string())
            .collect();
        self.sender
            .send(SessionToListenerCmd::Unsubscribe(
                self.id,
                packet.packet_id(),
                filters,
            ))
            .await
            .map(drop)?;
        Ok(())
    }

    async fn on_client_disconnect(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            return self.on_client_disconnect_v5(buf).await;
        }
        let mut ba = ByteArray::new(buf);
        let _packet = v3::DisconnectPacket::decode(&mut ba)?;
        // A 3.1.1 disconnect always discards the will message
        // [MQTT-3.14.4-3].
        self.clean_disconnect = true;
        self.status = Status::Closed;
        Ok(())
    }

    async fn on_client_auth(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.protocol_level != ProtocolLevel::V5 {
            self.status = Status::Closed;
            return Err(Error::new(
                ErrorKind::ProtocolError,
                "auth packet from a 3.1.1 client",
            ));
        }
        self.on_client_auth_v5(buf).await
    }
}
