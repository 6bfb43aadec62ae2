// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Authentication and authorization service.
//!
//! Keeps the user directory in memory as a hot-path cache, reloads it on
//! the configured refresh interval and on a reload command.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::interval;

use crate::commands::{AuthToListenerCmd, ListenerToAuthCmd, ServerContextToAuthCmd};
use crate::config::Security;
use crate::error::Error;
use crate::types::ListenerId;
use codec::v5::ReasonCode;

pub mod acl;
pub mod user;

use acl::AclOp;
use user::Directory;

#[derive(Debug)]
pub struct AuthApp {
    allow_anonymous: bool,
    user_management: bool,
    disconnect_on_unauthorized_publish: bool,
    users_file: Option<PathBuf>,
    refresh_interval: Duration,

    directory: Directory,

    listener_senders: Vec<(ListenerId, Sender<AuthToListenerCmd>)>,
    listener_receiver: Receiver<ListenerToAuthCmd>,

    server_ctx_receiver: Receiver<ServerContextToAuthCmd>,
}

impl AuthApp {
    /// Build the auth service from the security config.
    ///
    /// # Errors
    ///
    /// Returns error if the users file is configured but unreadable.
    pub fn new(
        security: &Security,
        // listeners
        listener_senders: Vec<(ListenerId, Sender<AuthToListenerCmd>)>,
        listener_receiver: Receiver<ListenerToAuthCmd>,
        // server ctx module
        server_ctx_receiver: Receiver<ServerContextToAuthCmd>,
    ) -> Result<Self, Error> {
        let directory = match security.users_file() {
            Some(path) => Directory::load_file(path)?,
            None => Directory::new(),
        };

        Ok(Self {
            allow_anonymous: security.allow_anonymous(),
            user_management: security.user_management(),
            disconnect_on_unauthorized_publish: security.disconnect_on_unauthorized_publish(),
            users_file: security.users_file().map(PathBuf::from),
            refresh_interval: Duration::from_secs(security.acl_refresh_interval().max(1)),
            directory,
            listener_senders,
            listener_receiver,
            server_ctx_receiver,
        })
    }

    pub async fn run_loop(&mut self) -> ! {
        let mut refresh_timer = interval(self.refresh_interval);

        loop {
            tokio::select! {
                Some(cmd) = self.listener_receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("auth: failed to handle listener cmd: {err:?}");
                    }
                }
                Some(cmd) = self.server_ctx_receiver.recv() => {
                    match cmd {
                        ServerContextToAuthCmd::ReloadUsers => self.reload(),
                    }
                }
                _ = refresh_timer.tick() => {
                    self.reload();
                }
            }
        }
    }

    fn reload(&mut self) {
        let Some(path) = &self.users_file else {
            return;
        };
        match Directory::load_file(path) {
            Ok(directory) => {
                log::info!("auth: reloaded {} users", directory.user_count());
                self.directory = directory;
            }
            Err(err) => {
                // Keep serving from the previous snapshot.
                log::error!("auth: reload failed: {err:?}");
            }
        }
    }

    async fn send_to_listener(
        &mut self,
        listener_id: ListenerId,
        cmd: AuthToListenerCmd,
    ) -> Result<(), Error> {
        if let Some((_, sender)) = self
            .listener_senders
            .iter()
            .find(|(id, _)| *id == listener_id)
        {
            sender.send(cmd).await.map(drop).map_err(Into::into)
        } else {
            Err(Error::from_string(
                crate::error::ErrorKind::ChannelError,
                format!("auth: unknown listener {listener_id}"),
            ))
        }
    }

    async fn handle_listener_cmd(&mut self, cmd: ListenerToAuthCmd) -> Result<(), Error> {
        match cmd {
            ListenerToAuthCmd::RequestAuth(gid, username, password) => {
                let reason = self.authenticate(username.as_deref(), &password);
                self.send_to_listener(
                    gid.listener_id(),
                    AuthToListenerCmd::ResponseAuth(gid, reason),
                )
                .await
            }
            ListenerToAuthCmd::CheckPublish(gid, username, packet_id, message) => {
                let allowed = self.allowed(username.as_deref(), message.topic(), AclOp::Publish);
                self.send_to_listener(
                    gid.listener_id(),
                    AuthToListenerCmd::PublishChecked(gid, packet_id, message, allowed),
                )
                .await
            }
            ListenerToAuthCmd::CheckSubscribe(gid, username, packet_id, requests) => {
                let verdicts = requests
                    .into_iter()
                    .map(|request| {
                        let allowed =
                            self.allowed(username.as_deref(), &request.filter, AclOp::Subscribe);
                        (request, allowed)
                    })
                    .collect();
                self.send_to_listener(
                    gid.listener_id(),
                    AuthToListenerCmd::SubscribeChecked(gid, packet_id, verdicts),
                )
                .await
            }
        }
    }

    fn authenticate(&self, username: Option<&str>, password: &[u8]) -> ReasonCode {
        let Some(username) = username.filter(|name| !name.is_empty()) else {
            return if self.allow_anonymous {
                ReasonCode::Success
            } else {
                ReasonCode::NotAuthorized
            };
        };

        let Some(user) = self.directory.find_user(username) else {
            return ReasonCode::BadUserNameOrPassword;
        };
        if !user.enabled {
            return ReasonCode::Banned;
        }
        if Directory::validate_password(user, password) {
            ReasonCode::Success
        } else {
            ReasonCode::BadUserNameOrPassword
        }
    }

    fn allowed(&self, username: Option<&str>, topic: &str, op: AclOp) -> bool {
        if !self.user_management {
            return true;
        }
        match username.filter(|name| !name.is_empty()) {
            // Anonymous clients are not subject to per-user rules.
            None => self.allow_anonymous,
            Some(username) => acl::evaluate(&self.directory, username, topic, op),
        }
    }

    /// Config switch consumed by listeners: disconnect or drop on an
    /// unauthorized publish.
    #[must_use]
    pub const fn disconnect_on_unauthorized_publish(&self) -> bool {
        self.disconnect_on_unauthorized_publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::User;
    use tokio::sync::mpsc;

    fn app(allow_anonymous: bool) -> AuthApp {
        let (_tx, listener_receiver) = mpsc::channel(4);
        let (_ctx_tx, server_ctx_receiver) = mpsc::channel(4);
        let security = Security::default();
        let mut app = AuthApp::new(&security, Vec::new(), listener_receiver, server_ctx_receiver)
            .unwrap();
        app.allow_anonymous = allow_anonymous;
        app
    }

    #[test]
    fn test_anonymous_authentication() {
        let app1 = app(true);
        assert_eq!(app1.authenticate(None, b""), ReasonCode::Success);

        let app2 = app(false);
        assert_eq!(app2.authenticate(None, b""), ReasonCode::NotAuthorized);
    }

    #[test]
    fn test_password_authentication() {
        let mut app = app(true);
        app.directory.upsert_user(User {
            username: "alice".to_string(),
            password_hash: bcrypt::hash("secret", 4).unwrap(),
            enabled: true,
            is_admin: false,
            can_subscribe: true,
            can_publish: true,
        });

        assert_eq!(
            app.authenticate(Some("alice"), b"secret"),
            ReasonCode::Success
        );
        assert_eq!(
            app.authenticate(Some("alice"), b"wrong"),
            ReasonCode::BadUserNameOrPassword
        );
        assert_eq!(
            app.authenticate(Some("nobody"), b"secret"),
            ReasonCode::BadUserNameOrPassword
        );
    }
}
