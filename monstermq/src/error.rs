// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use codec::v5::ReasonCode;
use std::fmt::{self, Display};
use std::io;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::commands::{
    ArchiveToDispatcherCmd, AuthToListenerCmd, DispatcherToArchiveCmd, DispatcherToListenerCmd,
    DispatcherToMetricsCmd, ListenerToAuthCmd, ListenerToDispatcherCmd, ListenerToSessionCmd,
    MetricsToDispatcherCmd, SessionToListenerCmd,
};

/// Represent the types of errors, aligned with the broker error taxonomy:
/// protocol errors close the connection with a reason code, authorization
/// failures are acknowledged, storage errors are retried or logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error occurred while performing I/O.
    IoError,

    /// Packet encode error.
    EncodeError,

    /// Packet decode error.
    DecodeError,

    /// Violation of the MQTT protocol rules on an open connection.
    ProtocolError,

    /// Send packet error.
    SendError,

    /// Socket stream error.
    SocketError,

    /// Cert files error.
    CertError,

    /// Invalid pid.
    PidError,

    /// Invalid config file entries.
    ConfigError,

    /// Failed to init logger module.
    LoggerError,

    /// Authentication or authorization failure.
    AuthError,

    /// Session with id not found.
    SessionNotFound,

    /// Storage backend failure.
    StorageError,

    /// Cluster lock or map failure.
    ClusterError,

    /// Bus request timed out or the address has no subscriber.
    BusError,

    /// mpsc channel error.
    ChannelError,

    /// Kernel syscall failure.
    KernelError,

    /// Invalid internal status.
    StatusError,
}

#[derive(Clone, Debug)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,

    /// MQTT 5.0 reason code attached to protocol errors; sent in the
    /// DISCONNECT or ACK packet when the peer speaks 5.0.
    reason: Option<ReasonCode>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
            reason: None,
        }
    }

    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            reason: None,
        }
    }

    /// A protocol error carrying the reason code to report to the client.
    pub fn protocol(reason: ReasonCode, message: &str) -> Self {
        Self {
            kind: ErrorKind::ProtocolError,
            message: message.to_owned(),
            reason: Some(reason),
        }
    }

    pub fn session_error(session_id: u64) -> Self {
        Self::from_string(
            ErrorKind::SessionNotFound,
            format!("Session with id {session_id} not found"),
        )
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn reason(&self) -> Option<ReasonCode> {
        self.reason
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.reason {
            Some(reason) => write!(f, "{:?} ({:?}): {}", self.kind, reason, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, format!("IoError {err}"))
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Self::from_string(ErrorKind::SocketError, format!("Websocket error: {err}"))
    }
}

impl From<tokio_rustls::rustls::Error> for Error {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::from_string(ErrorKind::CertError, format!("Rustls error: {err}"))
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        Self::from_string(ErrorKind::EncodeError, format!("{err:?}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::DecodeError, format!("{err:?}"))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::from_string(ErrorKind::BusError, format!("Request timed out: {err}"))
    }
}

#[cfg(feature = "pgsql_conn")]
impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::from_string(ErrorKind::StorageError, format!("Postgres error: {err}"))
    }
}

macro_rules! convert_send_error {
    ($cmd_type: ident) => {
        impl From<mpsc::error::SendError<$cmd_type>> for Error {
            fn from(err: mpsc::error::SendError<$cmd_type>) -> Self {
                Error::from_string(
                    ErrorKind::ChannelError,
                    format!("{} channel error: {}", stringify!($cmd_type), err),
                )
            }
        }
    };
}

convert_send_error!(ArchiveToDispatcherCmd);
convert_send_error!(AuthToListenerCmd);
convert_send_error!(DispatcherToArchiveCmd);
convert_send_error!(DispatcherToListenerCmd);
convert_send_error!(DispatcherToMetricsCmd);
convert_send_error!(ListenerToAuthCmd);
convert_send_error!(ListenerToDispatcherCmd);
convert_send_error!(ListenerToSessionCmd);
convert_send_error!(MetricsToDispatcherCmd);
convert_send_error!(SessionToListenerCmd);
