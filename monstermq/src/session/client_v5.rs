// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! MQTT 5.0 specific packet handling: connect properties, topic aliases,
//! subscription options and the enhanced authentication exchange.

use codec::utils::random_client_id;
use codec::{v5, ByteArray, DecodeError, DecodePacket};

use super::alias::AliasLookup;
use super::auth_exchange::{AuthExchange, ExchangeStep};
use super::{Session, Status};
use crate::commands::{ConnectContext, SubscriptionRequest, WillMessage};
use crate::error::Error;
use crate::message::BrokerMessage;
use crate::types::now_ms;

impl Session {
    pub(super) async fn on_client_connect_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let mut packet = match v5::ConnectPacket::decode(&mut ba) {
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

        let properties = packet.properties();
        let session_expiry_interval = properties.session_expiry_interval().unwrap_or(0);
        self.session_expiry_interval = session_expiry_interval;
        let receive_maximum = properties.receive_maximum().unwrap_or(u16::MAX);
        // An absent maximum packet size means the protocol limit, which
        // is also the upper bound of the property itself.
        let maximum_packet_size = properties
            .maximum_packet_size()
            .unwrap_or(codec::MAX_PACKET_LEN as u32);
        let topic_alias_maximum = properties.topic_alias_maximum().unwrap_or(0);
        self.client_maximum_packet_size = maximum_packet_size;
        // Outbound QoS > 0 deliveries are capped at the client's receive
        // maximum.
        self.window.set_capacity(receive_maximum);

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

                let will_properties = packet.will_properties();
                message.properties_mut().payload_format_indicator =
                    will_properties.payload_format_indicator();
                message.properties_mut().message_expiry_interval =
                    will_properties.message_expiry_interval();
                message.properties_mut().content_type =
                    will_properties.content_type().map(str::to_string);
                message.properties_mut().response_topic =
                    will_properties.response_topic().map(str::to_string);
                message.properties_mut().correlation_data =
                    will_properties.correlation_data().map(<[u8]>::to_vec);
                message.properties_mut().user_properties = will_properties
                    .user_properties()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();

                WillMessage {
                    message,
                    delay_interval: will_properties.will_delay_interval().unwrap_or(0),
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
            session_expiry_interval,
            receive_maximum,
            maximum_packet_size,
            topic_alias_maximum,
            will,
        };

        // An authentication method property switches to the enhanced
        // authentication exchange [MQTT-3.1.2-30].
        if let Some(method) = properties.authentication_method() {
            let Some(mut exchange) = AuthExchange::start(method) else {
                let ack =
                    v5::ConnectAckPacket::new(false, v5::ReasonCode::BadAuthenticationMethod);
                self.send(ack).await?;
                self.status = Status::Closed;
                return Ok(());
            };

            let data = properties.authentication_data().unwrap_or_default();
            match exchange.step(data) {
                ExchangeStep::Done { username, password } => {
                    let mut context = context;
                    context.username = Some(username);
                    context.password = password;
                    return self.finish_connect(context).await;
                }
                ExchangeStep::Continue(challenge) => {
                    self.status = Status::Authenticating;
                    self.pending_connect = Some(context);
                    let method = exchange.method().to_string();
                    self.auth_exchange = Some(exchange);
                    return self.send_auth_continue(&method, &challenge).await;
                }
                ExchangeStep::Failed => {
                    let ack =
                        v5::ConnectAckPacket::new(false, v5::ReasonCode::BadAuthenticationMethod);
                    self.send(ack).await?;
                    self.status = Status::Closed;
                    return Ok(());
                }
            }
        }

        self.finish_connect(context).await
    }

    async fn send_auth_continue(&mut self, method: &str, challenge: &[u8]) -> Result<(), Error> {
        let mut packet = v5::AuthPacket::new(v5::ReasonCode::ContinueAuthentication);
        packet
            .properties_mut()
            .push(v5::Property::AuthenticationMethod(
                codec::StringData::from(method).map_err(codec::EncodeError::from)?,
            ))
            .push(v5::Property::AuthenticationData(
                codec::BinaryData::from_slice(challenge)?,
            ));
        self.send(packet).await
    }

    /// Drive an in-progress enhanced auth exchange with an AUTH packet.
    pub(super) async fn on_client_auth_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = v5::AuthPacket::decode(&mut ba)?;

        let Some(exchange) = &mut self.auth_exchange else {
            self.close_with_reason(v5::ReasonCode::ProtocolError).await;
            return Err(Error::protocol(
                v5::ReasonCode::ProtocolError,
                "auth packet without an exchange in progress",
            ));
        };

        let data = packet.properties().authentication_data().unwrap_or_default();
        match exchange.step(data) {
            ExchangeStep::Done { username, password } => {
                self.auth_exchange = None;
                let Some(mut context) = self.pending_connect.take() else {
                    self.close_with_reason(v5::ReasonCode::ProtocolError).await;
                    return Err(Error::protocol(
                        v5::ReasonCode::ProtocolError,
                        "auth exchange without a pending connect",
                    ));
                };
                context.username = Some(username);
                context.password = password;
                self.finish_connect(context).await
            }
            ExchangeStep::Continue(challenge) => {
                let method = exchange.method().to_string();
                self.send_auth_continue(&method, &challenge).await
            }
            ExchangeStep::Failed => {
                self.auth_exchange = None;
                self.pending_connect = None;
                let ack =
                    v5::ConnectAckPacket::new(false, v5::ReasonCode::BadAuthenticationMethod);
                self.send(ack).await?;
                self.status = Status::Closed;
                Ok(())
            }
        }
    }

    pub(super) async fn on_client_publish_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = v5::PublishPacket::decode(&mut ba)?;

        // Resolve or register the topic alias. An alias outside the
        // advertised range, or an unknown alias with an empty topic name,
        // closes the connection with reason 0x94.
        let topic = match packet.properties().topic_alias() {
            Some(alias) => {
                if packet.topic().is_empty() {
                    match self.inbound_aliases.resolve(alias) {
                        AliasLookup::Topic(topic) => topic,
                        AliasLookup::Invalid => {
                            self.close_with_reason(v5::ReasonCode::TopicAliasInvalid).await;
                            return Err(Error::protocol(
                                v5::ReasonCode::TopicAliasInvalid,
                                "publish with unknown topic alias",
                            ));
                        }
                    }
                } else {
                    if !self.inbound_aliases.register(alias, packet.topic()) {
                        self.close_with_reason(v5::ReasonCode::TopicAliasInvalid).await;
                        return Err(Error::protocol(
                            v5::ReasonCode::TopicAliasInvalid,
                            "topic alias outside the advertised range",
                        ));
                    }
                    packet.topic().to_string()
                }
            }
            None => packet.topic().to_string(),
        };

        // Alias state is registered above even when the window is full;
        // the rejection only concerns this message.
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

        let message = BrokerMessage::from_v5_publish(&packet, &topic, &self.client_id, now_ms());

        // A format indicator of 1 promises UTF-8 payload data; violations
        // are logged and the message is forwarded as-is.
        if message.properties().payload_format_indicator == Some(true)
            && std::str::from_utf8(message.payload()).is_err()
        {
            log::warn!(
                "session {}: payload of {topic} declared UTF-8 but is not",
                self.id
            );
        }

        self.forward_publish(packet.packet_id(), message).await
    }

    pub(super) async fn on_client_subscribe_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = match v5::SubscribePacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
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
                no_local: topic.no_local(),
                retain_as_published: topic.retain_as_published(),
                retain_handling: topic.retain_handling(),
            })
            .collect();
        self.sender
            .send(crate::commands::SessionToListenerCmd::Subscribe(
                self.id,
                packet.packet_id(),
                requests,
            ))
            .await
            .map(drop)?;
        Ok(())
    }

    pub(super) async fn on_client_unsubscribe_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = v5::UnsubscribePacket::decode(&mut ba)?;
        let filters = packet
            .topics()
            .iter()
            .map(|topic| topic.as_ref().to_string())
            .collect();
        self.sender
            .send(crate::commands::SessionToListenerCmd::Unsubscribe(
                self.id,
                packet.packet_id(),
                filters,
            ))
            .await
            .map(drop)?;
        Ok(())
    }

    pub(super) async fn on_client_disconnect_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = v5::DisconnectPacket::decode(&mut ba)?;
        // Normal disconnection discards the will message; reason 0x04
        // explicitly keeps it [MQTT-3.1.2-10].
        self.clean_disconnect =
            packet.reason_code() != v5::ReasonCode::DisconnectWithWillMessage;
        self.status = Status::Closed;
        Ok(())
    }

    /// Render the CONNACK of a successful 5.0 connect with the broker's
    /// limits and the echoed session expiry.
    pub(super) fn build_connack_v5(
        &self,
        session_present: bool,
        session_expiry_interval: u32,
        assigned_client_id: Option<&str>,
    ) -> v5::ConnectAckPacket {
        let mut ack = v5::ConnectAckPacket::new(session_present, v5::ReasonCode::Success);
        let properties = ack.properties_mut();
        properties
            .push(v5::Property::SessionExpiryInterval(codec::U32Data::new(
                session_expiry_interval,
            )))
            .push(v5::Property::ReceiveMaximum(codec::U16Data::new(
                self.config.maximum_inflight_messages(),
            )))
            .push(v5::Property::MaximumQoS(codec::QoS::ExactOnce))
            .push(v5::Property::RetainAvailable(codec::BoolData::new(true)))
            .push(v5::Property::MaximumPacketSize(codec::U32Data::new(
                self.config.max_packet_size(),
            )))
            .push(v5::Property::ServerKeepAlive(codec::U16Data::new(
                self.server_keep_alive,
            )))
            .push(v5::Property::TopicAliasMaximum(codec::U16Data::new(
                self.config.topic_alias_maximum(),
            )))
            .push(v5::Property::WildcardSubscriptionAvailable(
                codec::BoolData::new(true),
            ))
            .push(v5::Property::SubscriptionIdentifierAvailable(
                codec::BoolData::new(false),
            ))
            .push(v5::Property::SharedSubscriptionAvailable(
                codec::BoolData::new(true),
            ));
        if let Some(client_id) = assigned_client_id {
            if let Ok(value) = codec::StringData::from(client_id) {
                properties.push(v5::Property::AssignedClientIdentifier(value));
            }
        }
        ack
    }
}
