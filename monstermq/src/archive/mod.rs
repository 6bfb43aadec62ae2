// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Archive group engine: filter-matching capture of published messages
//! into last-value and append-only sinks, with bulk batching and
//! retention purges.

use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::{interval, Instant};

use crate::cluster::CoordinatorHandle;
use crate::commands::{ArchiveToDispatcherCmd, DispatcherToArchiveCmd};
use crate::config;
use crate::error::Error;
use crate::message::BrokerMessage;
use crate::store::{
    LastValueStore, MemoryLastValueStore, MemoryMessageArchive, MessageArchive,
};
use crate::types::now_ms;
use codec::TopicFilter;

pub mod retention;

use retention::parse_retention;

/// Shared connections the sink backends draw from.
#[derive(Debug, Default, Clone)]
pub struct SinkContext {
    #[cfg(feature = "pgsql_conn")]
    pub pg_pool: Option<crate::store::PgPool>,
}

/// Last-value sink backend of one group.
#[derive(Debug)]
pub enum LastValueSink {
    Memory(MemoryLastValueStore),
    #[cfg(feature = "pgsql_conn")]
    Postgres(crate::store::PgLastValueStore),
}

impl LastValueSink {
    async fn set_all(&self, batch: &[BrokerMessage]) -> Result<(), Error> {
        match self {
            Self::Memory(sink) => sink.set_all(batch).await,
            #[cfg(feature = "pgsql_conn")]
            Self::Postgres(sink) => sink.set_all(batch).await,
        }
    }
}

/// Archive sink backend of one group.
#[derive(Debug)]
pub enum ArchiveSink {
    Memory(MemoryMessageArchive),
    #[cfg(feature = "pgsql_conn")]
    Postgres(crate::store::PgMessageArchive),
}

impl ArchiveSink {
    async fn append_all(&self, batch: &[BrokerMessage]) -> Result<(), Error> {
        match self {
            Self::Memory(sink) => sink.append_all(batch).await,
            #[cfg(feature = "pgsql_conn")]
            Self::Postgres(sink) => sink.append_all(batch).await,
        }
    }

    async fn purge_older_than(&self, cutoff_ms: u64) -> Result<u64, Error> {
        match self {
            Self::Memory(sink) => sink.purge_older_than(cutoff_ms).await,
            #[cfg(feature = "pgsql_conn")]
            Self::Postgres(sink) => sink.purge_older_than(cutoff_ms).await,
        }
    }
}

/// One configured archive group with its batching state.
#[derive(Debug)]
pub struct GroupEngine {
    name: String,
    enabled: bool,
    retained_only: bool,
    filters: Vec<TopicFilter>,
    last_value: Option<LastValueSink>,
    archive: Option<ArchiveSink>,
    retention: Option<Duration>,

    batch: Vec<BrokerMessage>,
    batch_size: usize,
    batch_timeout: Duration,
    last_flush: Instant,
}

impl GroupEngine {
    /// Build a group engine from its config section.
    ///
    /// # Errors
    ///
    /// Returns error if a filter or the retention is malformed, or a
    /// postgres sink cannot be initialized.
    #[allow(unused_variables)]
    pub async fn build(group: &config::ArchiveGroup, ctx: &SinkContext) -> Result<Self, Error> {
        let mut filters = Vec::with_capacity(group.topic_filters().len());
        for filter in group.topic_filters() {
            filters.push(TopicFilter::parse(filter).map_err(|err| {
                Error::from_string(
                    crate::error::ErrorKind::ConfigError,
                    format!("archive {}: invalid filter {filter}: {err:?}", group.name()),
                )
            })?);
        }

        let retention = match group.retention() {
            Some(text) => Some(parse_retention(text).map_err(|err| {
                Error::from_string(
                    crate::error::ErrorKind::ConfigError,
                    format!("archive {}: {err}", group.name()),
                )
            })?),
            None => None,
        };

        let last_value = match group.last_value() {
            config::SinkKind::None => None,
            config::SinkKind::Memory => Some(LastValueSink::Memory(MemoryLastValueStore::new())),
            #[cfg(feature = "pgsql_conn")]
            config::SinkKind::Postgres => {
                let pool = ctx.pg_pool.as_ref().ok_or_else(|| {
                    Error::new(
                        crate::error::ErrorKind::ConfigError,
                        "archive postgres sink needs pg_connection",
                    )
                })?;
                Some(LastValueSink::Postgres(
                    crate::store::PgLastValueStore::new(pool.clone(), group.name()).await?,
                ))
            }
            #[cfg(not(feature = "pgsql_conn"))]
            config::SinkKind::Postgres => {
                return Err(Error::new(
                    crate::error::ErrorKind::ConfigError,
                    "archive postgres sink requires the pgsql_conn feature",
                ))
            }
        };

        let archive = match group.archive() {
            config::SinkKind::None => None,
            config::SinkKind::Memory => Some(ArchiveSink::Memory(MemoryMessageArchive::new())),
            #[cfg(feature = "pgsql_conn")]
            config::SinkKind::Postgres => {
                let pool = ctx.pg_pool.as_ref().ok_or_else(|| {
                    Error::new(
                        crate::error::ErrorKind::ConfigError,
                        "archive postgres sink needs pg_connection",
                    )
                })?;
                Some(ArchiveSink::Postgres(
                    crate::store::PgMessageArchive::new(pool.clone(), group.name()).await?,
                ))
            }
            #[cfg(not(feature = "pgsql_conn"))]
            config::SinkKind::Postgres => {
                return Err(Error::new(
                    crate::error::ErrorKind::ConfigError,
                    "archive postgres sink requires the pgsql_conn feature",
                ))
            }
        };

        Ok(Self {
            name: group.name().to_string(),
            enabled: group.enabled(),
            retained_only: group.retained_only(),
            filters,
            last_value,
            archive,
            retention,
            batch: Vec::new(),
            batch_size: group.batch_size(),
            batch_timeout: Duration::from_secs(group.batch_timeout()),
            last_flush: Instant::now(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this group captures `message`.
    #[must_use]
    pub fn matches(&self, message: &BrokerMessage) -> bool {
        if !self.enabled {
            return false;
        }
        if self.retained_only && !message.retain() {
            return false;
        }
        self.filters
            .iter()
            .any(|filter| filter.is_match(message.topic()))
    }

    /// Add `message` to the batch; a full batch flushes right away.
    pub async fn offer(&mut self, message: BrokerMessage) {
        self.batch.push(message);
        if self.batch.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Flush when the batch timeout elapsed.
    pub async fn flush_if_due(&mut self, now: Instant) {
        if !self.batch.is_empty() && now.duration_since(self.last_flush) >= self.batch_timeout {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);

        if let Some(sink) = &self.last_value {
            if let Err(err) = sink.set_all(&batch).await {
                log::error!("archive {}: last value write failed: {err:?}", self.name);
            }
        }
        if let Some(sink) = &self.archive {
            if let Err(err) = sink.append_all(&batch).await {
                log::error!("archive {}: append failed: {err:?}", self.name);
            }
        }
    }

    /// Purge archived rows past the configured retention. Returns the
    /// removed row count.
    pub async fn purge(&mut self, now: u64) -> u64 {
        let (Some(retention), Some(sink)) = (self.retention, &self.archive) else {
            return 0;
        };
        let cutoff = now.saturating_sub(
            u64::try_from(retention.as_millis()).unwrap_or(u64::MAX),
        );
        match sink.purge_older_than(cutoff).await {
            Ok(removed) => removed,
            Err(err) => {
                log::error!("archive {}: purge failed: {err:?}", self.name);
                0
            }
        }
    }
}

/// Archive service actor fanning published messages into all groups.
pub struct ArchiveApp {
    groups: Vec<GroupEngine>,
    purge_interval: Duration,
    coordinator: CoordinatorHandle,

    dispatcher_sender: Sender<ArchiveToDispatcherCmd>,
    dispatcher_receiver: Receiver<DispatcherToArchiveCmd>,
}

impl ArchiveApp {
    #[must_use]
    pub fn new(
        groups: Vec<GroupEngine>,
        purge_interval: Duration,
        coordinator: CoordinatorHandle,
        // dispatcher module
        dispatcher_sender: Sender<ArchiveToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToArchiveCmd>,
    ) -> Self {
        Self {
            groups,
            purge_interval,
            coordinator,
            dispatcher_sender,
            dispatcher_receiver,
        }
    }

    pub async fn run_loop(&mut self) -> ! {
        let mut flush_timer = interval(Duration::from_millis(500));
        let mut purge_timer = interval(self.purge_interval);

        loop {
            tokio::select! {
                Some(cmd) = self.dispatcher_receiver.recv() => {
                    match cmd {
                        DispatcherToArchiveCmd::Store(message) => {
                            self.store(message).await;
                        }
                    }
                }
                tick = flush_timer.tick() => {
                    for group in &mut self.groups {
                        group.flush_if_due(tick).await;
                    }
                }
                _ = purge_timer.tick() => {
                    self.purge_all().await;
                }
            }
        }
    }

    async fn store(&mut self, message: BrokerMessage) {
        for group in &mut self.groups {
            if group.matches(&message) {
                group.offer(message.clone()).await;
            }
        }
    }

    /// Retention purge, leader-elected per group through a cluster lock.
    async fn purge_all(&mut self) {
        let now = now_ms();
        for group in &mut self.groups {
            let lock_name = format!("archive-purge-{}", group.name());
            let Some(_guard) = self
                .coordinator
                .acquire_lock(&lock_name, Duration::from_secs(5))
                .await
            else {
                continue;
            };
            let removed = group.purge(now).await;
            if removed > 0 {
                let cmd = ArchiveToDispatcherCmd::PurgeDone(group.name().to_string(), removed);
                if let Err(err) = self.dispatcher_sender.send(cmd).await {
                    log::error!("archive: failed to report purge: {err:?}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use codec::QoS;

    fn group_config(text: &str) -> config::ArchiveGroup {
        toml::from_str(text).unwrap()
    }

    async fn engine(text: &str) -> GroupEngine {
        let group = group_config(text);
        GroupEngine::build(&group, &SinkContext::default())
            .await
            .unwrap()
    }

    fn message(topic: &str, retain: bool) -> BrokerMessage {
        let mut msg =
            BrokerMessage::new(topic, Bytes::from_static(b"v"), QoS::AtMostOnce, "p", 1_000);
        msg.set_retain(retain);
        msg
    }

    #[tokio::test]
    async fn test_filter_and_retained_only() {
        let engine = engine(
            r#"
name = "plant"
topic_filters = ["plant/#"]
retained_only = true
last_value = "memory"
"#,
        )
        .await;

        assert!(engine.matches(&message("plant/line1", true)));
        assert!(!engine.matches(&message("plant/line1", false)));
        assert!(!engine.matches(&message("office/temp", true)));
    }

    #[tokio::test]
    async fn test_batch_flushes_at_size() {
        let mut engine = engine(
            r##"
name = "g"
topic_filters = ["#"]
archive = "memory"
batch_size = 2
"##,
        )
        .await;

        engine.offer(message("a", false)).await;
        let Some(ArchiveSink::Memory(sink)) = &engine.archive else {
            panic!("memory sink expected");
        };
        assert!(sink.is_empty());

        engine.offer(message("b", false)).await;
        let Some(ArchiveSink::Memory(sink)) = &engine.archive else {
            panic!("memory sink expected");
        };
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_uses_retention() {
        let mut engine = engine(
            r##"
name = "g"
topic_filters = ["#"]
archive = "memory"
retention = "10s"
batch_size = 1
"##,
        )
        .await;

        engine.offer(message("old", false)).await;
        // 1000ms creation + 10s retention => gone at 12s.
        assert_eq!(engine.purge(12_000).await, 1);
    }
}
