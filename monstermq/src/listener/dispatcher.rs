// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Handles commands from the dispatcher.

use super::Listener;
use crate::commands::{DispatcherToListenerCmd, ListenerToSessionCmd};
use crate::error::Error;
use crate::types::SessionId;

impl Listener {
    pub(super) async fn handle_dispatcher_cmd(
        &mut self,
        cmd: DispatcherToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            DispatcherToListenerCmd::ConnectAck {
                session_id,
                reason,
                session_present,
            } => {
                if reason != codec::v5::ReasonCode::Success {
                    self.connected_sessions.remove(&session_id);
                }
                self.send_to_session(
                    session_id,
                    ListenerToSessionCmd::ConnectAck {
                        reason,
                        session_present,
                    },
                )
                .await
            }

            DispatcherToListenerCmd::Publish(session_id, publish) => {
                self.send_to_session(session_id, ListenerToSessionCmd::Publish(publish))
                    .await
            }

            DispatcherToListenerCmd::UnsubscribeAck(session_id, packet_id, reasons) => {
                self.send_to_session(
                    session_id,
                    ListenerToSessionCmd::UnsubscribeAck(packet_id, reasons),
                )
                .await
            }

            DispatcherToListenerCmd::Disconnect(session_id, reason) => {
                self.send_to_session(session_id, ListenerToSessionCmd::Disconnect(reason))
                    .await
            }
        }
    }

    pub(super) async fn send_to_session(
        &mut self,
        session_id: SessionId,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        let Some(sender) = self.session_senders.get(&session_id) else {
            return Err(Error::session_error(session_id));
        };
        sender.send(cmd).await.map(drop).map_err(Into::into)
    }
}
