// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Security {
    /// Determines whether clients that connect without providing a
    /// username are allowed to connect.
    ///
    /// Default is true.
    #[serde(default = "Security::default_allow_anonymous")]
    allow_anonymous: bool,

    /// Enable the user directory and ACL evaluation.
    ///
    /// When disabled every authenticated operation is permitted.
    /// Default is true.
    #[serde(default = "Security::default_user_management")]
    user_management: bool,

    /// TOML file with `[[users]]` and `[[acl]]` tables.
    ///
    /// Default is None.
    #[serde(default = "Security::default_users_file")]
    users_file: Option<PathBuf>,

    /// Close the connection when a publish is rejected by the ACL.
    /// When false the message is dropped and QoS > 0 publishes are
    /// acknowledged with the not-authorized reason code.
    ///
    /// Default is true.
    #[serde(default = "Security::default_disconnect_on_unauthorized_publish")]
    disconnect_on_unauthorized_publish: bool,

    /// Seconds between reloads of the user and ACL cache.
    ///
    /// Default is 60 seconds.
    #[serde(default = "Security::default_acl_refresh_interval")]
    acl_refresh_interval: u64,
}

impl Security {
    #[must_use]
    pub const fn default_allow_anonymous() -> bool {
        true
    }

    #[must_use]
    pub const fn default_user_management() -> bool {
        true
    }

    #[must_use]
    pub const fn default_users_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_disconnect_on_unauthorized_publish() -> bool {
        true
    }

    #[must_use]
    pub const fn default_acl_refresh_interval() -> u64 {
        60
    }

    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    #[must_use]
    pub const fn user_management(&self) -> bool {
        self.user_management
    }

    #[must_use]
    pub fn users_file(&self) -> Option<&Path> {
        self.users_file.as_deref()
    }

    #[must_use]
    pub const fn disconnect_on_unauthorized_publish(&self) -> bool {
        self.disconnect_on_unauthorized_publish
    }

    #[must_use]
    pub const fn acl_refresh_interval(&self) -> u64 {
        self.acl_refresh_interval
    }

    /// Validate security config.
    ///
    /// # Errors
    ///
    /// Returns error if user management is on without any credential
    /// source while anonymous access is off.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.allow_anonymous && self.users_file.is_none() {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "users_file is required when allow_anonymous is false",
            ));
        }
        Ok(())
    }
}

impl Default for Security {
    fn default() -> Self {
        Self {
            allow_anonymous: Self::default_allow_anonymous(),
            user_management: Self::default_user_management(),
            users_file: Self::default_users_file(),
            disconnect_on_unauthorized_publish: Self::default_disconnect_on_unauthorized_publish(),
            acl_refresh_interval: Self::default_acl_refresh_interval(),
        }
    }
}
