// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::Error;

mod archive;
mod cluster;
mod general;
mod listener;
mod log;
mod security;
mod storage;

pub use self::log::{Log, LogLevel};
pub use archive::{ArchiveGroup, SinkKind};
pub use cluster::Cluster;
pub use general::General;
pub use listener::{Listener, Protocol};
pub use security::Security;
pub use storage::{Backend, Storage};

/// Broker main config, usually loaded from a TOML file.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "General::default")]
    general: General,

    #[serde(default = "Listener::default_listeners")]
    listeners: Vec<Listener>,

    #[serde(default = "Security::default")]
    security: Security,

    #[serde(default = "Storage::default")]
    storage: Storage,

    #[serde(default)]
    archive_groups: Vec<ArchiveGroup>,

    #[serde(default = "Cluster::default")]
    cluster: Cluster,

    #[serde(default = "Log::default")]
    log: Log,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    #[must_use]
    pub const fn security(&self) -> &Security {
        &self.security
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn archive_groups(&self) -> &[ArchiveGroup] {
        &self.archive_groups
    }

    #[must_use]
    pub const fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// Validate the whole config.
    ///
    /// # Errors
    ///
    /// Returns error if any section contains invalid options.
    pub fn validate(&self) -> Result<(), Error> {
        self.general.validate()?;
        for listener in &self.listeners {
            if !listener.is_disabled() {
                listener.validate()?;
            }
        }
        self.security.validate()?;
        self.storage.validate()?;
        for group in &self.archive_groups {
            group.validate()?;
        }
        self.cluster.validate()?;
        self.log.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listeners().len(), 1);
        assert_eq!(config.listeners()[0].address(), "0.0.0.0:1883");
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
[general]
pid_file = "/tmp/monstermq-test.pid"
max_keepalive = 120

[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:1883"

[[listeners]]
protocol = "ws"
address = "127.0.0.1:0"
path = "/mqtt"

[security]
allow_anonymous = true

[storage]
session_store = "memory"

[[archive_groups]]
name = "plant"
topic_filters = ["plant/#"]
last_value = "memory"
archive = "memory"
retention = "7d"

[cluster]
enabled = false
node_id = "node-a"

[log]
log_file = "/tmp/monstermq-test.log"
log_level = "debug"
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general().max_keepalive(), 120);
        assert!(config.listeners()[1].is_disabled());
        assert_eq!(config.archive_groups()[0].name(), "plant");
        assert_eq!(config.cluster().node_id(), "node-a");
    }

    #[test]
    fn test_invalid_archive_filter_rejected() {
        let text = r#"
[[archive_groups]]
name = "bad"
topic_filters = ["a/#/b"]
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }
}
