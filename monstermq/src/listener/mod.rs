// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Listener: accepts connections on one transport, spawns session tasks
//! and relays between sessions, the auth service and the dispatcher.

use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{
    AuthToListenerCmd, ConnectContext, DispatcherToListenerCmd, ListenerToAuthCmd,
    ListenerToDispatcherCmd, ListenerToSessionCmd, SessionToListenerCmd,
};
use crate::config;
use crate::types::{ClientId, ListenerId, SessionGid, SessionId};

mod auth;
mod dispatcher;
mod init;
mod protocol;
mod run;
mod session;

use protocol::Protocol;

const CHANNEL_CAPACITY: usize = 16;

/// Client state the listener tracks per connected session.
#[derive(Debug)]
struct ConnectedClient {
    client_id: ClientId,
    username: Option<String>,
}

pub struct Listener {
    id: ListenerId,
    protocol: Protocol,
    config: config::Listener,
    max_keepalive: u16,
    disconnect_on_unauthorized_publish: bool,
    current_session_id: SessionId,

    session_senders: HashMap<SessionId, Sender<ListenerToSessionCmd>>,

    /// Sessions whose connect is in flight through auth and dispatcher.
    connecting_sessions: HashMap<SessionId, ConnectContext>,

    /// Sessions past their CONNACK.
    connected_sessions: HashMap<SessionId, ConnectedClient>,
    client_ids: BTreeMap<ClientId, SessionId>,

    session_sender: Sender<SessionToListenerCmd>,
    session_receiver: Option<Receiver<SessionToListenerCmd>>,

    dispatcher_sender: Sender<ListenerToDispatcherCmd>,
    dispatcher_receiver: Option<Receiver<DispatcherToListenerCmd>>,

    auth_sender: Sender<ListenerToAuthCmd>,
    auth_receiver: Option<Receiver<AuthToListenerCmd>>,
}

impl Listener {
    pub(crate) fn gid(&self, session_id: SessionId) -> SessionGid {
        SessionGid::new(self.id, session_id)
    }

    fn next_session_id(&mut self) -> SessionId {
        self.current_session_id += 1;
        self.current_session_id
    }
}
