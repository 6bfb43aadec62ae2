// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

/// Selectable storage backend kind.
///
/// The set of supported backends is fixed at compile time; the choice is
/// resolved from config into a concrete store at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,

    /// Requires the `pgsql_conn` cargo feature.
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Storage {
    /// Backend of sessions, subscriptions and offline queues.
    #[serde(default = "Storage::default_backend")]
    session_store: Backend,

    /// Backend of retained messages.
    #[serde(default = "Storage::default_backend")]
    retained_store: Backend,

    /// Backend of aggregated broker metrics.
    #[serde(default = "Storage::default_backend")]
    metrics_store: Backend,

    /// Connection string of the PostgreSQL backends, like
    /// `host=localhost user=monstermq dbname=monstermq`.
    #[serde(default = "Storage::default_pg_connection")]
    pg_connection: Option<String>,
}

impl Storage {
    #[must_use]
    pub const fn default_backend() -> Backend {
        Backend::Memory
    }

    #[must_use]
    pub const fn default_pg_connection() -> Option<String> {
        None
    }

    #[must_use]
    pub const fn session_store(&self) -> Backend {
        self.session_store
    }

    #[must_use]
    pub const fn retained_store(&self) -> Backend {
        self.retained_store
    }

    #[must_use]
    pub const fn metrics_store(&self) -> Backend {
        self.metrics_store
    }

    #[must_use]
    pub fn pg_connection(&self) -> Option<&str> {
        self.pg_connection.as_deref()
    }

    fn uses_postgres(&self) -> bool {
        [self.session_store, self.retained_store, self.metrics_store]
            .contains(&Backend::Postgres)
    }

    /// Validate storage config.
    ///
    /// # Errors
    ///
    /// Returns error if a postgres backend is selected without a
    /// connection string, or without the `pgsql_conn` feature.
    pub fn validate(&self) -> Result<(), Error> {
        if self.uses_postgres() {
            if self.pg_connection.is_none() {
                return Err(Error::new(
                    ErrorKind::ConfigError,
                    "pg_connection is required for postgres backends",
                ));
            }
            #[cfg(not(feature = "pgsql_conn"))]
            return Err(Error::new(
                ErrorKind::ConfigError,
                "postgres backends require the pgsql_conn feature",
            ));
        }
        Ok(())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            session_store: Self::default_backend(),
            retained_store: Self::default_backend(),
            metrics_store: Self::default_backend(),
            pg_connection: Self::default_pg_connection(),
        }
    }
}
