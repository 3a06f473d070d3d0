// src/core/errors.rs

//! Defines the error types of the client: `ClientError` is what the host sees,
//! `TransportError` is what the transport collaborator reports.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A discriminated view of `ClientError`, for hosts that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotConnected,
    ConnectionError,
    CommandError,
    AlreadySubscribed,
    UnknownError,
}

/// The error returned by every host-facing operation.
///
/// Variants that wrap a `String` carry the transport's diagnostic text verbatim,
/// so `Display` for them is the bare text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Command(String),

    #[error("Subscription can only be performed once")]
    AlreadySubscribed,

    #[error("{0}")]
    Unknown(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::NotConnected => ErrorKind::NotConnected,
            ClientError::Connection(_) => ErrorKind::ConnectionError,
            ClientError::Command(_) => ErrorKind::CommandError,
            ClientError::AlreadySubscribed => ErrorKind::AlreadySubscribed,
            ClientError::Unknown(_) => ErrorKind::UnknownError,
        }
    }

    /// The diagnostic text of the error, as shown to the host.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Converts a failure raised while establishing a connection.
    pub(crate) fn from_connect(err: TransportError) -> Self {
        match err {
            TransportError::Unclassified(msg) => ClientError::Unknown(msg),
            other => ClientError::Connection(other.to_string()),
        }
    }

    /// Converts a failure raised by a command on an established connection.
    pub(crate) fn from_command(err: TransportError) -> Self {
        match err {
            TransportError::Unclassified(msg) => ClientError::Unknown(msg),
            other => ClientError::Command(other.to_string()),
        }
    }
}

/// The result type of every host-facing operation.
pub type CommandResult<T> = Result<T, ClientError>;

/// Failures reported by the transport collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    /// An error reply sent by the server, e.g. `WRONGPASS ...`.
    #[error("{0}")]
    Server(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed by peer")]
    Closed,

    #[error("{0}")]
    Unclassified(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for TransportError {
    fn clone(&self) -> Self {
        match self {
            TransportError::Io(e) => TransportError::Io(Arc::clone(e)),
            TransportError::IncompleteData => TransportError::IncompleteData,
            TransportError::Server(s) => TransportError::Server(s.clone()),
            TransportError::Timeout(s) => TransportError::Timeout(s.clone()),
            TransportError::PoolTimeout(d) => TransportError::PoolTimeout(*d),
            TransportError::Protocol(s) => TransportError::Protocol(s.clone()),
            TransportError::Closed => TransportError::Closed,
            TransportError::Unclassified(s) => TransportError::Unclassified(s.clone()),
        }
    }
}

impl PartialEq for TransportError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TransportError::Io(e1), TransportError::Io(e2)) => e1.to_string() == e2.to_string(),
            (TransportError::Server(s1), TransportError::Server(s2)) => s1 == s2,
            (TransportError::Timeout(s1), TransportError::Timeout(s2)) => s1 == s2,
            (TransportError::PoolTimeout(d1), TransportError::PoolTimeout(d2)) => d1 == d2,
            (TransportError::Protocol(s1), TransportError::Protocol(s2)) => s1 == s2,
            (TransportError::Unclassified(s1), TransportError::Unclassified(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(Arc::new(e))
    }
}

impl From<tokio::time::error::Elapsed> for TransportError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        TransportError::Timeout("operation timed out".to_string())
    }
}
