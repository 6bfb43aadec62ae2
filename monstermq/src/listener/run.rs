// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Handles commands and new connections.

use tokio::sync::mpsc;

use super::{Listener, CHANNEL_CAPACITY};
use crate::session::{Session, SessionConfig};
use crate::stream::Stream;

impl Listener {
    /// # Panics
    ///
    /// Raise panic if failed to unpack channel receivers.
    pub async fn run_loop(&mut self) -> ! {
        // Take ownership of mpsc receivers or else tokio select will
        // raise error.
        let mut session_receiver = self
            .session_receiver
            .take()
            .expect("Invalid session receiver");
        let mut dispatcher_receiver = self
            .dispatcher_receiver
            .take()
            .expect("Invalid dispatcher receiver");
        let mut auth_receiver = self.auth_receiver.take().expect("Invalid auth receiver");

        loop {
            tokio::select! {
                accepted = self.accept() => {
                    match accepted {
                        Ok(stream) => self.new_connection(stream),
                        Err(err) => log::error!("listener {}: accept failed: {err:?}", self.id),
                    }
                }

                Some(cmd) = session_receiver.recv() => {
                    if let Err(err) = self.handle_session_cmd(cmd).await {
                        log::error!("listener {}: session cmd failed: {err:?}", self.id);
                    }
                }

                Some(cmd) = dispatcher_receiver.recv() => {
                    if let Err(err) = self.handle_dispatcher_cmd(cmd).await {
                        log::error!("listener {}: dispatcher cmd failed: {err:?}", self.id);
                    }
                }

                Some(cmd) = auth_receiver.recv() => {
                    if let Err(err) = self.handle_auth_cmd(cmd).await {
                        log::error!("listener {}: auth cmd failed: {err:?}", self.id);
                    }
                }
            }
        }
    }

    fn new_connection(&mut self, stream: Stream) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let session_id = self.next_session_id();
        self.session_senders.insert(session_id, sender);

        let mut session_config = SessionConfig::new();
        session_config
            .set_keep_alive(self.config.keep_alive())
            .set_max_keepalive(self.max_keepalive)
            .set_connect_timeout(self.config.connect_timeout())
            .set_allow_empty_client_id(self.config.allow_empty_client_id())
            .set_max_packet_size(self.config.max_packet_size())
            .set_maximum_inflight_messages(self.config.maximum_inflight_messages())
            .set_maximum_queued_messages(self.config.maximum_queued_messages())
            .set_topic_alias_maximum(self.config.topic_alias_maximum());

        let session = Session::new(
            session_id,
            session_config,
            stream,
            self.session_sender.clone(),
            receiver,
        );
        tokio::spawn(session.run_loop());
    }
}
