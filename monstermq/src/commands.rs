// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Command enums exchanged between the broker actors over mpsc channels.
//!
//! Naming follows the `<sender>To<receiver>Cmd` convention; each actor owns
//! one receiver per peer and a sender map for the reverse direction.

use codec::v5::{ReasonCode, RetainHandling};
use codec::{PacketId, ProtocolLevel, QoS};
use tokio::sync::oneshot;

use crate::message::BrokerMessage;
use crate::types::{ClientId, ListenerId, SessionGid, SessionId};

/// Will message taken from a connect packet, published on ungraceful
/// disconnect after `delay_interval` seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillMessage {
    pub message: BrokerMessage,
    pub delay_interval: u32,
}

/// Normalized connect state, built by the session from a 3.1.1 or 5.0
/// connect packet.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    pub client_id: ClientId,

    /// True if the broker generated the client id for an empty one.
    pub assigned_client_id: bool,

    pub username: Option<String>,
    pub password: Vec<u8>,

    pub protocol: ProtocolLevel,
    pub clean_start: bool,
    pub keep_alive: u16,

    /// Seconds the session survives a disconnect. Zero ends the session
    /// with the network connection.
    pub session_expiry_interval: u32,

    /// Limit of concurrent QoS > 0 deliveries towards this client.
    pub receive_maximum: u16,

    pub maximum_packet_size: u32,

    /// Highest alias the client accepts in server to client publishes.
    pub topic_alias_maximum: u16,

    pub will: Option<WillMessage>,
}

/// One filter of a subscribe packet with its option bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub filter: String,
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

/// A message transformed for one recipient: effective QoS and retain flag
/// are already computed, the packet id is assigned by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPublish {
    pub message: BrokerMessage,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug, Clone)]
pub enum SessionToListenerCmd {
    /// Client sent a connect packet; authentication and session lookup
    /// happen upstream.
    Connect(SessionId, ConnectContext),

    /// Normalized inbound publish. The packet id is echoed back in
    /// `PublishResult` so the endpoint can acknowledge.
    Publish(SessionId, PacketId, BrokerMessage),

    Subscribe(SessionId, PacketId, Vec<SubscriptionRequest>),

    Unsubscribe(SessionId, PacketId, Vec<String>),

    /// The flow control window freed `usize` slots after PUBACK/PUBCOMP.
    WindowOpened(SessionId, usize),

    /// Session task ended. `publish_will` is false after a clean
    /// DISCONNECT packet; `requeue` carries unacknowledged and pending
    /// messages of a persistent session.
    Disconnect {
        session_id: SessionId,
        publish_will: bool,
        requeue: Vec<BrokerMessage>,
    },
}

#[derive(Debug, Clone)]
pub enum ListenerToSessionCmd {
    /// Result of connect processing; on success the endpoint sends the
    /// CONNACK and enters the connected state.
    ConnectAck {
        reason: ReasonCode,
        session_present: bool,
    },

    /// Deliver one message to this client.
    Publish(OutboundPublish),

    /// Verdict on an inbound publish; triggers PUBACK / PUBREC.
    PublishResult {
        packet_id: PacketId,
        qos: QoS,
        accepted: bool,
        disconnect: bool,
    },

    SubscribeAck(PacketId, Vec<ReasonCode>),

    UnsubscribeAck(PacketId, Vec<ReasonCode>),

    /// Server side disconnect, like a session takeover.
    Disconnect(ReasonCode),
}

#[derive(Debug, Clone)]
pub enum ListenerToAuthCmd {
    /// Authenticate connect credentials.
    RequestAuth(SessionGid, Option<String>, Vec<u8>),

    /// ACL check of an inbound publish; the message rides along and comes
    /// back with the verdict.
    CheckPublish(SessionGid, Option<String>, PacketId, BrokerMessage),

    /// ACL check of subscribe filters.
    CheckSubscribe(SessionGid, Option<String>, PacketId, Vec<SubscriptionRequest>),
}

#[derive(Debug, Clone)]
pub enum AuthToListenerCmd {
    /// `ReasonCode::Success` grants the connection.
    ResponseAuth(SessionGid, ReasonCode),

    PublishChecked(SessionGid, PacketId, BrokerMessage, bool),

    /// Per-filter verdicts in request order.
    SubscribeChecked(SessionGid, PacketId, Vec<(SubscriptionRequest, bool)>),
}

#[derive(Debug, Clone)]
pub enum ListenerToDispatcherCmd {
    /// An authenticated client finished connect processing; the
    /// dispatcher resumes or creates the stored session and replies with
    /// `ConnectAck`.
    SessionConnected {
        gid: SessionGid,
        client_id: ClientId,
        clean_start: bool,
        session_expiry_interval: u32,
        receive_maximum: u16,
        maximum_packet_size: u32,
        topic_alias_maximum: u16,
        will: Option<WillMessage>,
    },

    /// Inbound publish which already passed the ACL.
    Publish(SessionGid, BrokerMessage),

    /// Install ACL-granted subscriptions and deliver retained messages
    /// per their retain handling option.
    Subscribe(SessionGid, ClientId, Vec<SubscriptionRequest>),

    /// Remove subscriptions; the dispatcher acks with per-filter codes.
    Unsubscribe(SessionGid, ClientId, PacketId, Vec<String>),

    /// Connection ended.
    SessionDisconnected {
        gid: SessionGid,
        client_id: ClientId,
        publish_will: bool,
        requeue: Vec<BrokerMessage>,
    },

    /// The endpoint freed flow control slots; queued messages may be
    /// released.
    WindowOpened(SessionGid, ClientId, usize),
}

#[derive(Debug, Clone)]
pub enum DispatcherToListenerCmd {
    ConnectAck {
        session_id: SessionId,
        reason: ReasonCode,
        session_present: bool,
    },

    Publish(SessionId, OutboundPublish),

    UnsubscribeAck(SessionId, PacketId, Vec<ReasonCode>),

    /// Close a session from the server side, like a takeover by a new
    /// connection with the same client id.
    Disconnect(SessionId, ReasonCode),
}

#[derive(Debug, Clone)]
pub enum DispatcherToArchiveCmd {
    /// Fan a published message into the matching archive groups.
    Store(BrokerMessage),
}

#[derive(Debug, Clone)]
pub enum ArchiveToDispatcherCmd {
    /// A retention purge finished: group name and removed row count.
    PurgeDone(String, u64),
}

#[derive(Debug, Clone)]
pub enum DispatcherToMetricsCmd {
    SessionAdded(ListenerId),
    SessionRemoved(ListenerId),
    SubscriptionsAdded(ListenerId, usize),
    SubscriptionsRemoved(ListenerId, usize),
    RetainedMessageAdded(usize),
    RetainedMessageRemoved(usize),
    /// count, bytes
    PublishPacketReceived(usize, usize),
    /// count, bytes
    PublishPacketSent(usize, usize),
    /// count, bytes
    PublishPacketDropped(usize, usize),
    MessagesQueued(usize),
}

#[derive(Debug, Clone)]
pub enum MetricsToDispatcherCmd {
    /// Broker originated message, like the `$SYS/uptime` gauge.
    Publish(BrokerMessage),
}

#[derive(Debug)]
pub enum ServerContextToAuthCmd {
    /// Reload the user and ACL files, triggered by SIGUSR1.
    ReloadUsers,
}

#[derive(Debug)]
pub enum ServerContextToMetricsCmd {
    GetUptime(oneshot::Sender<u64>),
}
