// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct Cluster {
    /// Run as a cluster member. Membership and discovery come from the
    /// distribution layer; a single node runs with local locks and an
    /// always-responsible coordinator.
    ///
    /// Default is false.
    #[serde(default = "Cluster::default_enabled")]
    enabled: bool,

    /// Stable identifier of this node inside the cluster.
    ///
    /// Default is "node-0".
    #[serde(default = "Cluster::default_node_id")]
    node_id: String,
}

impl Cluster {
    #[must_use]
    pub const fn default_enabled() -> bool {
        false
    }

    #[must_use]
    pub fn default_node_id() -> String {
        "node-0".to_string()
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Validate cluster config.
    ///
    /// # Errors
    ///
    /// Returns error if the node id is empty.
    pub fn validate(&self) -> Result<(), Error> {
        if self.node_id.is_empty() {
            return Err(Error::new(
                crate::error::ErrorKind::ConfigError,
                "cluster node_id must not be empty",
            ));
        }
        Ok(())
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            node_id: Self::default_node_id(),
        }
    }
}
