// src/core/connection/handle.rs

use crate::config::ConnectionConfig;
use crate::core::errors::{ClientError, CommandResult};
use crate::core::transport::Connection;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// An opaque reference to the live transport connection.
///
/// Clones share one validity flag: once the owning `ConnectionManager`
/// disconnects, every clone reports `NotConnected`.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    config: ConnectionConfig,
    connection: Arc<dyn Connection>,
    valid: AtomicBool,
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, config: ConnectionConfig, connection: Arc<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                config,
                connection,
                valid: AtomicBool::new(true),
            }),
        }
    }

    /// A per-manager sequence number; a reconnect always yields a larger id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The configuration this handle was opened with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::SeqCst)
    }

    /// The transport connection, or `NotConnected` once the handle is invalidated.
    pub(crate) fn connection(&self) -> CommandResult<&Arc<dyn Connection>> {
        if self.is_valid() {
            Ok(&self.inner.connection)
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// The transport connection regardless of validity, for teardown.
    pub(crate) fn transport(&self) -> &Arc<dyn Connection> {
        &self.inner.connection
    }

    /// Returns true if this call was the one that invalidated the handle.
    pub(crate) fn invalidate(&self) -> bool {
        self.inner.valid.swap(false, Ordering::SeqCst)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.config.addr())
            .field("db", &self.inner.config.db)
            .field("valid", &self.is_valid())
            .finish()
    }
}
