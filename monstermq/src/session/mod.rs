// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Per-connection client endpoint: the MQTT 3.1.1 / 5.0 connection state
//! machine, keep alive, flow control window, topic alias table and will
//! scheduling hooks.

use codec::{
    ByteArray, DecodeError, DecodePacket, EncodePacket, FixedHeader, Packet, PacketId, PacketType,
    ProtocolLevel,
};
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{ConnectContext, ListenerToSessionCmd, SessionToListenerCmd};
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;
use crate::types::SessionId;

mod alias;
mod auth_exchange;
mod client;
mod client_v5;
mod config;
mod flow;
mod listener;

pub use config::SessionConfig;

use alias::TopicAliasTable;
use auth_exchange::AuthExchange;
use flow::InflightWindow;

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Socket open, waiting for the connect packet.
    AwaitConnect,

    /// Connect received, credentials being checked.
    Authenticating,

    Connected,

    Disconnecting,

    Closed,
}

/// One client connection and all of its per-connection state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    stream: Stream,

    status: Status,
    protocol_level: ProtocolLevel,
    client_id: String,
    clean_session: bool,
    assigned_client_id: bool,

    /// Echoed in the 5.0 CONNACK.
    session_expiry_interval: u32,

    /// Seconds of allowed silence; 1.5 times the negotiated keep alive.
    /// Zero disables the check.
    keep_alive_timeout: u64,

    /// Negotiated keep alive, echoed in the 5.0 CONNACK.
    server_keep_alive: u16,

    /// Largest packet the client accepts from us.
    client_maximum_packet_size: u32,

    /// Reset whenever a packet is sent or received.
    last_packet: Instant,

    read_buf: Vec<u8>,

    /// Inbound QoS 2 packet ids received and not yet released.
    pub_recv_packets: HashSet<PacketId>,

    /// Inbound QoS > 0 publishes occupying the receive window: forwarded
    /// and not yet acknowledged, or awaiting their PUBREL.
    inbound_in_flight: usize,

    window: InflightWindow,

    /// Client to server topic aliases.
    inbound_aliases: TopicAliasTable,

    /// In-progress enhanced authentication, if any.
    auth_exchange: Option<AuthExchange>,

    /// Connect context parked while an enhanced auth exchange runs.
    pending_connect: Option<ConnectContext>,

    /// True after a DISCONNECT packet with normal disconnection, which
    /// discards the will message.
    clean_disconnect: bool,

    sender: Sender<SessionToListenerCmd>,
    receiver: Receiver<ListenerToSessionCmd>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        stream: Stream,
        sender: Sender<SessionToListenerCmd>,
        receiver: Receiver<ListenerToSessionCmd>,
    ) -> Self {
        let window = InflightWindow::new(
            config.maximum_inflight_messages(),
            config.maximum_queued_messages(),
        );
        let inbound_aliases = TopicAliasTable::new(config.topic_alias_maximum());
        Self {
            id,
            config,
            stream,

            status: Status::AwaitConnect,
            protocol_level: ProtocolLevel::V311,
            client_id: String::new(),
            clean_session: true,
            assigned_client_id: false,
            session_expiry_interval: 0,

            keep_alive_timeout: 0,
            server_keep_alive: 0,
            client_maximum_packet_size: codec::MAX_PACKET_LEN as u32,

            last_packet: Instant::now(),
            read_buf: Vec::with_capacity(4096),

            pub_recv_packets: HashSet::new(),
            inbound_in_flight: 0,
            window,
            inbound_aliases,
            auth_exchange: None,
            pending_connect: None,
            clean_disconnect: false,

            sender,
            receiver,
        }
    }

    pub async fn run_loop(mut self) {
        let opened_at = Instant::now();

        loop {
            // If the Server does not receive a CONNECT packet within a
            // reasonable amount of time after the network connection is
            // established, the Server SHOULD close the connection.
            if self.status == Status::AwaitConnect
                && self.config.connect_timeout() > 0
                && opened_at.elapsed().as_secs() > self.config.connect_timeout()
            {
                log::info!("session {}: connect timeout", self.id);
                break;
            }

            if self.status == Status::Closed {
                break;
            }

            tokio::select! {
                read = self.stream.read_buf(&mut self.read_buf) => {
                    match read {
                        Ok(0) => {
                            log::info!("session {}: peer closed connection", self.id);
                            break;
                        }
                        Ok(_) => {
                            if let Err(err) = self.process_read_buf().await {
                                log::error!("session {}: {err}", self.id);
                                break;
                            }
                        }
                        Err(err) => {
                            log::info!("session {}: read failed: {err}", self.id);
                            break;
                        }
                    }
                }
                Some(cmd) = self.receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("session {}: listener cmd failed: {err}", self.id);
                    }
                }
                // Wake up periodically so silent connections hit the
                // connect and keep alive timeouts below.
                () = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
            }

            // If the Keep Alive value is non-zero and the Server does not
            // receive a Control Packet from the Client within one and a
            // half times the Keep Alive time period, it MUST disconnect
            // the Network Connection [MQTT-3.1.2-24].
            if self.keep_alive_timeout > 0
                && self.last_packet.elapsed().as_secs() > self.keep_alive_timeout
            {
                log::warn!("session {}: keep alive elapsed, disconnecting", self.id);
                self.close_with_reason(codec::v5::ReasonCode::KeepAliveTimeout)
                    .await;
                break;
            }
        }

        self.status = Status::Closed;
        let requeue = if self.clean_session {
            Vec::new()
        } else {
            self.window.drain_undelivered()
        };
        let cmd = SessionToListenerCmd::Disconnect {
            session_id: self.id,
            publish_will: !self.clean_disconnect,
            requeue,
        };
        if let Err(err) = self.sender.send(cmd).await {
            log::error!("session {}: failed to send disconnect cmd: {err}", self.id);
        }
    }

    /// Reset the silence timer; called on every packet in either
    /// direction.
    fn reset_last_packet(&mut self) {
        self.last_packet = Instant::now();
    }

    /// Carve complete packets out of the read buffer and handle them in
    /// arrival order.
    async fn process_read_buf(&mut self) -> Result<(), Error> {
        loop {
            let mut ba = ByteArray::new(&self.read_buf);
            let fixed_header = match FixedHeader::decode(&mut ba) {
                Ok(header) => header,
                // An incomplete fixed header stays in the buffer.
                Err(DecodeError::OutOfRangeError) => return Ok(()),
                Err(err) => {
                    log::error!("session {}: malformed packet: {err:?}", self.id);
                    self.close_with_reason(codec::v5::ReasonCode::MalformedPacket)
                        .await;
                    return Err(err.into());
                }
            };

            let total = fixed_header.bytes() + fixed_header.remaining_length();
            if total > self.config.max_packet_size() as usize {
                self.close_with_reason(codec::v5::ReasonCode::PacketTooLarge)
                    .await;
                return Err(Error::protocol(
                    codec::v5::ReasonCode::PacketTooLarge,
                    "inbound packet exceeds maximum packet size",
                ));
            }
            if self.read_buf.len() < total {
                return Ok(());
            }

            let packet: Vec<u8> = self.read_buf.drain(..total).collect();
            self.reset_last_packet();
            self.handle_client_packet(&packet).await?;

            if self.status == Status::Closed {
                return Ok(());
            }
        }
    }

    /// Encode and write one packet, respecting the client's maximum
    /// packet size.
    pub(super) async fn send<P: EncodePacket + Packet>(&mut self, packet: P) -> Result<(), Error> {
        // The first packet sent from the Server to the Client MUST be a
        // CONNACK packet [MQTT-3.2.0-1].
        if self.status == Status::Authenticating
            && !matches!(
                packet.packet_type(),
                PacketType::ConnectAck | PacketType::Auth
            )
        {
            log::error!(
                "session {}: refusing to send {:?} before connack",
                self.id,
                packet.packet_type()
            );
        }

        if self.status == Status::Closed {
            return Err(Error::from_string(
                ErrorKind::SendError,
                format!(
                    "session: cannot send {:?} on closed stream",
                    packet.packet_type()
                ),
            ));
        }

        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        if buf.len() > self.client_maximum_packet_size as usize {
            log::warn!(
                "session {}: dropping {:?}, larger than client maximum",
                self.id,
                packet.packet_type()
            );
            return Ok(());
        }
        self.stream.write(&buf).await.map(drop)?;
        self.reset_last_packet();
        Ok(())
    }

    /// Send a server side disconnect and close.
    pub(super) async fn close_with_reason(&mut self, reason: codec::v5::ReasonCode) {
        if self.status == Status::Closed {
            return;
        }
        self.status = Status::Disconnecting;
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = codec::v5::DisconnectPacket::new(reason);
            if let Err(err) = self.send(packet).await {
                log::error!("session {}: failed to send disconnect: {err}", self.id);
            }
        }
        // 3.1.1 has no server disconnect packet; the socket just closes.
        self.status = Status::Closed;
    }
}
