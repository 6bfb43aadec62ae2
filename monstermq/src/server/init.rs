// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Init server context internal modules.

use std::time::Duration;
use tokio::sync::mpsc;

use super::{ServerContext, CHANNEL_CAPACITY};
use crate::archive::{ArchiveApp, GroupEngine, SinkContext};
use crate::auth::AuthApp;
use crate::bus::LocalBus;
use crate::cluster::CoordinatorHandle;
use crate::config;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::listener::Listener;
use crate::metrics::Metrics;
use crate::scheduler;
use crate::store::{MetricsBackend, RetainedBackend, SessionBackend};

impl ServerContext {
    #[allow(clippy::too_many_lines)]
    pub(crate) async fn init_modules(&mut self) -> Result<(), Error> {
        log::info!("ServerContext::init_modules()");

        let node_id = self.config.cluster().node_id().to_string();
        if self.config.cluster().enabled() {
            log::info!("cluster mode on, node id {node_id}; membership comes from the distribution layer");
        }

        let coordinator = CoordinatorHandle::standalone(&node_id);
        let bus = LocalBus::new();

        // Storage backends; failure here aborts startup.
        let session_store = SessionBackend::build(self.config.storage()).await?;
        let retained_store = RetainedBackend::build(self.config.storage()).await?;
        let metrics_store = MetricsBackend::build(self.config.storage()).await?;

        let (scheduler_handle, timer_receiver) = scheduler::start();

        // Channels of the actor graph.
        let (listeners_to_dispatcher_sender, listeners_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (listeners_to_auth_sender, listeners_to_auth_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (dispatcher_to_archive_sender, dispatcher_to_archive_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (archive_to_dispatcher_sender, archive_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (dispatcher_to_metrics_sender, dispatcher_to_metrics_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (metrics_to_dispatcher_sender, metrics_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (server_to_auth_sender, server_to_auth_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (server_to_metrics_sender, server_to_metrics_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        self.auth_sender = Some(server_to_auth_sender);
        self.metrics_sender = Some(server_to_metrics_sender);

        // Listeners.
        let mut dispatcher_to_listener_senders = Vec::new();
        let mut auth_to_listener_senders = Vec::new();
        let mut maximum_queued_messages = config::Listener::default_maximum_queued_messages();
        let enabled_listeners: Vec<&config::Listener> = self
            .config
            .listeners()
            .iter()
            .filter(|listener| !listener.is_disabled())
            .collect();
        for (listener_id, listener_config) in (0_u32..).zip(enabled_listeners.into_iter()) {
            maximum_queued_messages =
                maximum_queued_messages.max(listener_config.maximum_queued_messages());

            let (dispatcher_to_listener_sender, dispatcher_to_listener_receiver) =
                mpsc::channel(CHANNEL_CAPACITY);
            dispatcher_to_listener_senders.push((listener_id, dispatcher_to_listener_sender));
            let (auth_to_listener_sender, auth_to_listener_receiver) =
                mpsc::channel(CHANNEL_CAPACITY);
            auth_to_listener_senders.push((listener_id, auth_to_listener_sender));

            let mut listener = Listener::bind(
                listener_id,
                listener_config.clone(),
                self.config.general().max_keepalive(),
                self.config.security().disconnect_on_unauthorized_publish(),
                listeners_to_dispatcher_sender.clone(),
                dispatcher_to_listener_receiver,
                listeners_to_auth_sender.clone(),
                auth_to_listener_receiver,
            )
            .await?;
            tokio::spawn(async move { listener.run_loop().await });
        }

        // Archive groups.
        #[allow(unused_mut)]
        let mut sink_ctx = SinkContext::default();
        #[cfg(feature = "pgsql_conn")]
        {
            sink_ctx.pg_pool = match self.config.storage().pg_connection() {
                Some(conn) if self.archive_needs_postgres() => {
                    Some(crate::store::PgPool::connect(conn).await?)
                }
                _ => None,
            };
        }
        let mut groups = Vec::new();
        for group_config in self.config.archive_groups() {
            groups.push(GroupEngine::build(group_config, &sink_ctx).await?);
        }
        let mut archive = ArchiveApp::new(
            groups,
            Duration::from_secs(self.config.general().purge_interval()),
            coordinator.clone(),
            archive_to_dispatcher_sender,
            dispatcher_to_archive_receiver,
        );
        tokio::spawn(async move { archive.run_loop().await });

        // Auth service.
        let mut auth = AuthApp::new(
            self.config.security(),
            auth_to_listener_senders,
            listeners_to_auth_receiver,
            server_to_auth_receiver,
        )?;
        tokio::spawn(async move { auth.run_loop().await });

        // Metrics service.
        let mut metrics = Metrics::new(
            &node_id,
            Duration::from_secs(self.config.general().sys_interval()),
            Duration::from_secs(self.config.general().metrics_interval()),
            metrics_store,
            bus.clone(),
            coordinator.clone(),
            metrics_to_dispatcher_sender,
            dispatcher_to_metrics_receiver,
            server_to_metrics_receiver,
        );
        tokio::spawn(async move { metrics.run_loop().await });

        // Dispatcher.
        let mut dispatcher = Dispatcher::new(
            &node_id,
            session_store,
            retained_store,
            coordinator,
            bus,
            scheduler_handle,
            timer_receiver,
            maximum_queued_messages,
            Duration::from_secs(self.config.general().purge_interval()),
            dispatcher_to_listener_senders,
            listeners_to_dispatcher_receiver,
            dispatcher_to_archive_sender,
            archive_to_dispatcher_receiver,
            dispatcher_to_metrics_sender,
            metrics_to_dispatcher_receiver,
        );
        tokio::spawn(async move { dispatcher.run_loop().await });

        Ok(())
    }

    #[cfg(feature = "pgsql_conn")]
    fn archive_needs_postgres(&self) -> bool {
        self.config.archive_groups().iter().any(|group| {
            group.last_value() == config::SinkKind::Postgres
                || group.archive() == config::SinkKind::Postgres
        })
    }
}
