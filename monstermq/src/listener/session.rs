// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Handles commands from session tasks.

use super::Listener;
use crate::commands::{
    ListenerToAuthCmd, ListenerToDispatcherCmd, SessionToListenerCmd,
};
use crate::error::Error;
use crate::types::SessionId;

impl Listener {
    pub(super) async fn handle_session_cmd(
        &mut self,
        cmd: SessionToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            SessionToListenerCmd::Connect(session_id, context) => {
                let gid = self.gid(session_id);
                let username = context.username.clone();
                let password = context.password.clone();
                self.connecting_sessions.insert(session_id, context);
                self.auth_sender
                    .send(ListenerToAuthCmd::RequestAuth(gid, username, password))
                    .await
                    .map(drop)
                    .map_err(Into::into)
            }

            SessionToListenerCmd::Publish(session_id, packet_id, message) => {
                let Some(client) = self.connected_sessions.get(&session_id) else {
                    return Err(Error::session_error(session_id));
                };
                self.auth_sender
                    .send(ListenerToAuthCmd::CheckPublish(
                        self.gid(session_id),
                        client.username.clone(),
                        packet_id,
                        message,
                    ))
                    .await
                    .map(drop)
                    .map_err(Into::into)
            }

            SessionToListenerCmd::Subscribe(session_id, packet_id, requests) => {
                let Some(client) = self.connected_sessions.get(&session_id) else {
                    return Err(Error::session_error(session_id));
                };
                self.auth_sender
                    .send(ListenerToAuthCmd::CheckSubscribe(
                        self.gid(session_id),
                        client.username.clone(),
                        packet_id,
                        requests,
                    ))
                    .await
                    .map(drop)
                    .map_err(Into::into)
            }

            SessionToListenerCmd::Unsubscribe(session_id, packet_id, filters) => {
                let Some(client) = self.connected_sessions.get(&session_id) else {
                    return Err(Error::session_error(session_id));
                };
                self.dispatcher_sender
                    .send(ListenerToDispatcherCmd::Unsubscribe(
                        self.gid(session_id),
                        client.client_id.clone(),
                        packet_id,
                        filters,
                    ))
                    .await
                    .map(drop)
                    .map_err(Into::into)
            }

            SessionToListenerCmd::WindowOpened(session_id, slots) => {
                let Some(client) = self.connected_sessions.get(&session_id) else {
                    // Late window updates of a dropped session are fine.
                    return Ok(());
                };
                self.dispatcher_sender
                    .send(ListenerToDispatcherCmd::WindowOpened(
                        self.gid(session_id),
                        client.client_id.clone(),
                        slots,
                    ))
                    .await
                    .map(drop)
                    .map_err(Into::into)
            }

            SessionToListenerCmd::Disconnect {
                session_id,
                publish_will,
                requeue,
            } => self.on_session_disconnect(session_id, publish_will, requeue).await,
        }
    }

    async fn on_session_disconnect(
        &mut self,
        session_id: SessionId,
        publish_will: bool,
        requeue: Vec<crate::message::BrokerMessage>,
    ) -> Result<(), Error> {
        self.session_senders.remove(&session_id);
        self.connecting_sessions.remove(&session_id);

        let Some(client) = self.connected_sessions.remove(&session_id) else {
            // Closed before ever finishing a connect.
            return Ok(());
        };

        // A takeover may have remapped the client id to a newer session.
        if self.client_ids.get(&client.client_id) == Some(&session_id) {
            self.client_ids.remove(&client.client_id);
        }

        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionDisconnected {
                gid: self.gid(session_id),
                client_id: client.client_id,
                publish_will,
                requeue,
            })
            .await
            .map(drop)
            .map_err(Into::into)
    }
}
