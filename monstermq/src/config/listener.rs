// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Transport of one listener.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain TCP.
    Mqtt,

    /// TCP with TLS.
    Mqtts,

    /// WebSocket.
    Ws,

    /// WebSocket with TLS.
    Wss,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Listener {
    /// Transport protocol, default is plain TCP.
    #[serde(default = "Listener::default_protocol")]
    protocol: Protocol,

    /// Binding address including the port, like `0.0.0.0:1883`.
    /// A port of 0 disables the listener.
    #[serde(default = "Listener::default_address")]
    address: String,

    /// Bind to a specific network device, Linux only.
    #[serde(default = "Listener::default_bind_device")]
    bind_device: String,

    /// Path to the PEM certificate chain, required for mqtts and wss.
    #[serde(default = "Listener::default_cert_file")]
    cert_file: Option<PathBuf>,

    /// Path to the PEM private key, required for mqtts and wss.
    #[serde(default = "Listener::default_key_file")]
    key_file: Option<PathBuf>,

    /// URL path WebSocket upgrades must use, like `/mqtt`.
    /// None accepts any path.
    #[serde(default = "Listener::default_path")]
    path: Option<String>,

    /// Keep alive in seconds used when the client requests zero.
    #[serde(default = "Listener::default_keep_alive")]
    keep_alive: u64,

    /// Seconds a connection may stay silent before its connect packet.
    ///
    /// Default is 10 seconds.
    #[serde(default = "Listener::default_connect_timeout")]
    connect_timeout: u64,

    /// Accept connect packets with a zero length client id and assign a
    /// generated id.
    #[serde(default = "Listener::default_allow_empty_client_id")]
    allow_empty_client_id: bool,

    /// Largest accepted control packet in bytes.
    ///
    /// Default is 512 KiB.
    #[serde(default = "Listener::default_max_packet_size")]
    max_packet_size: u32,

    /// Receive maximum the broker advertises to 5.0 clients, which is
    /// also the per-connection in-flight window towards 3.1.1 clients.
    #[serde(default = "Listener::default_maximum_inflight_messages")]
    maximum_inflight_messages: u16,

    /// Bound of the per-client offline queue; the oldest messages are
    /// dropped beyond it.
    #[serde(default = "Listener::default_maximum_queued_messages")]
    maximum_queued_messages: usize,

    /// Topic alias maximum the broker advertises to 5.0 clients.
    #[serde(default = "Listener::default_topic_alias_maximum")]
    topic_alias_maximum: u16,
}

impl Listener {
    #[must_use]
    pub const fn default_protocol() -> Protocol {
        Protocol::Mqtt
    }

    #[must_use]
    pub fn default_address() -> String {
        format!("0.0.0.0:{DEFAULT_MQTT_PORT}")
    }

    #[must_use]
    pub fn default_bind_device() -> String {
        String::new()
    }

    #[must_use]
    pub const fn default_cert_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_key_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_path() -> Option<String> {
        None
    }

    #[must_use]
    pub const fn default_keep_alive() -> u64 {
        60
    }

    #[must_use]
    pub const fn default_connect_timeout() -> u64 {
        10
    }

    #[must_use]
    pub const fn default_allow_empty_client_id() -> bool {
        true
    }

    #[must_use]
    pub const fn default_max_packet_size() -> u32 {
        512 * 1024
    }

    #[must_use]
    pub const fn default_maximum_inflight_messages() -> u16 {
        100
    }

    #[must_use]
    pub const fn default_maximum_queued_messages() -> usize {
        1000
    }

    #[must_use]
    pub const fn default_topic_alias_maximum() -> u16 {
        10
    }

    #[must_use]
    pub fn default_listeners() -> Vec<Self> {
        vec![Self::default()]
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn bind_device(&self) -> &str {
        &self.bind_device
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u64 {
        self.keep_alive
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    #[must_use]
    pub const fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }

    #[must_use]
    pub const fn maximum_inflight_messages(&self) -> u16 {
        self.maximum_inflight_messages
    }

    #[must_use]
    pub const fn maximum_queued_messages(&self) -> usize {
        self.maximum_queued_messages
    }

    #[must_use]
    pub const fn topic_alias_maximum(&self) -> u16 {
        self.topic_alias_maximum
    }

    /// A listener on port 0 is configured off.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.address.ends_with(":0")
    }

    /// Validate listener config.
    ///
    /// # Errors
    ///
    /// Returns error if the address is malformed, TLS files are missing
    /// for a TLS transport, or limits are zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.address.rsplit_once(':').is_none() {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("Listener address must contain a port: {}", self.address),
            ));
        }
        if matches!(self.protocol, Protocol::Mqtts | Protocol::Wss) {
            if self.cert_file.is_none() {
                return Err(Error::new(
                    ErrorKind::ConfigError,
                    "cert_file is required for TLS listeners",
                ));
            }
            if self.key_file.is_none() {
                return Err(Error::new(
                    ErrorKind::ConfigError,
                    "key_file is required for TLS listeners",
                ));
            }
        }
        if self.maximum_inflight_messages == 0 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "maximum_inflight_messages must be greater than zero",
            ));
        }
        if self.max_packet_size == 0 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "max_packet_size must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            protocol: Self::default_protocol(),
            address: Self::default_address(),
            bind_device: Self::default_bind_device(),
            cert_file: Self::default_cert_file(),
            key_file: Self::default_key_file(),
            path: Self::default_path(),
            keep_alive: Self::default_keep_alive(),
            connect_timeout: Self::default_connect_timeout(),
            allow_empty_client_id: Self::default_allow_empty_client_id(),
            max_packet_size: Self::default_max_packet_size(),
            maximum_inflight_messages: Self::default_maximum_inflight_messages(),
            maximum_queued_messages: Self::default_maximum_queued_messages(),
            topic_alias_maximum: Self::default_topic_alias_maximum(),
        }
    }
}
