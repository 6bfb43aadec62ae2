// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Error;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Also write log records to the console.
    ///
    /// Default is true.
    #[serde(default = "Log::default_console_log")]
    console_log: bool,

    /// Rolling log file location.
    ///
    /// Default is "/tmp/monstermq.log".
    #[serde(default = "Log::default_log_file")]
    log_file: PathBuf,

    /// Default is "info".
    #[serde(default = "Log::default_log_level")]
    log_level: LogLevel,
}

impl Log {
    #[must_use]
    pub const fn default_console_log() -> bool {
        true
    }

    #[must_use]
    pub fn default_log_file() -> PathBuf {
        PathBuf::from("/tmp/monstermq.log")
    }

    #[must_use]
    pub const fn default_log_level() -> LogLevel {
        LogLevel::Info
    }

    #[must_use]
    pub const fn console_log(&self) -> bool {
        self.console_log
    }

    #[must_use]
    pub fn log_file(&self) -> &Path {
        self.log_file.as_path()
    }

    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Validate log config.
    ///
    /// # Errors
    ///
    /// Returns error if the log directory does not exist.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(dir) = self.log_file.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                return Err(Error::from_string(
                    crate::error::ErrorKind::ConfigError,
                    format!("log directory does not exist: {dir:?}"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            console_log: Self::default_console_log(),
            log_file: Self::default_log_file(),
            log_level: Self::default_log_level(),
        }
    }
}
