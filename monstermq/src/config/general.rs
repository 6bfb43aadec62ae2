// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct General {
    /// File to write the process id to.
    ///
    /// Default is `/tmp/monstermq.pid`.
    #[serde(default = "General::default_pid_file")]
    pid_file: PathBuf,

    /// Upper bound for the keep alive value a client may request, in
    /// seconds. Requests above it are clamped and the clamped value is
    /// echoed in the 5.0 CONNACK server keep alive property.
    ///
    /// Zero disables the clamp. Default is 0.
    #[serde(default = "General::default_max_keepalive")]
    max_keepalive: u16,

    /// Interval in seconds of the expired-message purge task.
    ///
    /// Default is 60 seconds.
    #[serde(default = "General::default_purge_interval")]
    purge_interval: u64,

    /// Interval in seconds of metrics aggregation.
    ///
    /// Default is 60 seconds.
    #[serde(default = "General::default_metrics_interval")]
    metrics_interval: u64,

    /// Interval in seconds of the `$SYS/uptime` publication.
    ///
    /// Default is 3 seconds.
    #[serde(default = "General::default_sys_interval")]
    sys_interval: u64,
}

impl General {
    #[must_use]
    pub fn default_pid_file() -> PathBuf {
        PathBuf::from("/tmp/monstermq.pid")
    }

    #[must_use]
    pub const fn default_max_keepalive() -> u16 {
        0
    }

    #[must_use]
    pub const fn default_purge_interval() -> u64 {
        60
    }

    #[must_use]
    pub const fn default_metrics_interval() -> u64 {
        60
    }

    #[must_use]
    pub const fn default_sys_interval() -> u64 {
        3
    }

    #[must_use]
    pub fn pid_file(&self) -> &Path {
        self.pid_file.as_path()
    }

    #[must_use]
    pub const fn max_keepalive(&self) -> u16 {
        self.max_keepalive
    }

    #[must_use]
    pub const fn purge_interval(&self) -> u64 {
        self.purge_interval
    }

    #[must_use]
    pub const fn metrics_interval(&self) -> u64 {
        self.metrics_interval
    }

    #[must_use]
    pub const fn sys_interval(&self) -> u64 {
        self.sys_interval
    }

    /// Validate general config.
    ///
    /// # Errors
    ///
    /// Returns error if an interval is zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.purge_interval == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "purge_interval must be greater than zero",
            ));
        }
        if self.metrics_interval == 0 {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "metrics_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            pid_file: Self::default_pid_file(),
            max_keepalive: Self::default_max_keepalive(),
            purge_interval: Self::default_purge_interval(),
            metrics_interval: Self::default_metrics_interval(),
            sys_interval: Self::default_sys_interval(),
        }
    }
}
