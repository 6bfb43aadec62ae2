// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::archive::retention::parse_retention;
use crate::error::{Error, ErrorKind};
use codec::TopicFilter;

/// Sink backend of an archive group.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// No sink configured.
    #[default]
    None,

    Memory,

    /// Requires the `pgsql_conn` cargo feature.
    Postgres,
}

/// One named capture pipeline: messages matching any filter are projected
/// into a last-value sink and appended to an archive sink.
#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveGroup {
    name: String,

    #[serde(default = "ArchiveGroup::default_enabled")]
    enabled: bool,

    /// Topic filters selecting the captured messages.
    #[serde(default)]
    topic_filters: Vec<String>,

    /// Capture only messages published with the retain flag.
    #[serde(default)]
    retained_only: bool,

    #[serde(default)]
    last_value: SinkKind,

    #[serde(default)]
    archive: SinkKind,

    /// Retention of archived rows, like `30s`, `5m`, `12h`, `7d`, `4w`,
    /// `6M` or `1y`. None keeps rows forever.
    #[serde(default)]
    retention: Option<String>,

    /// Rows per bulk write.
    #[serde(default = "ArchiveGroup::default_batch_size")]
    batch_size: usize,

    /// Seconds after which a partial batch is flushed.
    #[serde(default = "ArchiveGroup::default_batch_timeout")]
    batch_timeout: u64,
}

impl ArchiveGroup {
    #[must_use]
    pub const fn default_enabled() -> bool {
        true
    }

    #[must_use]
    pub const fn default_batch_size() -> usize {
        1000
    }

    #[must_use]
    pub const fn default_batch_timeout() -> u64 {
        5
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn topic_filters(&self) -> &[String] {
        &self.topic_filters
    }

    #[must_use]
    pub const fn retained_only(&self) -> bool {
        self.retained_only
    }

    #[must_use]
    pub const fn last_value(&self) -> SinkKind {
        self.last_value
    }

    #[must_use]
    pub const fn archive(&self) -> SinkKind {
        self.archive
    }

    #[must_use]
    pub fn retention(&self) -> Option<&str> {
        self.retention.as_deref()
    }

    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub const fn batch_timeout(&self) -> u64 {
        self.batch_timeout
    }

    /// Validate one archive group.
    ///
    /// # Errors
    ///
    /// Returns error if a filter or the retention interval is malformed.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::new(ErrorKind::ConfigError, "archive group needs a name"));
        }
        for filter in &self.topic_filters {
            TopicFilter::parse(filter).map_err(|err| {
                Error::from_string(
                    ErrorKind::ConfigError,
                    format!("archive group {}: invalid filter {filter}: {err:?}", self.name),
                )
            })?;
        }
        if let Some(retention) = &self.retention {
            parse_retention(retention).map_err(|err| {
                Error::from_string(
                    ErrorKind::ConfigError,
                    format!("archive group {}: {err}", self.name),
                )
            })?;
        }
        if self.batch_size == 0 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "archive batch_size must be greater than zero",
            ));
        }
        Ok(())
    }
}
