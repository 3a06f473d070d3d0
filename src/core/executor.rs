// src/core/executor.rs

//! Request/response commands bound to one connection handle.

use crate::core::connection::ConnectionHandle;
use crate::core::errors::{ClientError, CommandResult};
use std::time::Duration;
use tracing::debug;

/// Executes `SET`/`GET`/`DEL`/`PUBLISH` against the handle's connection and
/// converts every transport failure into a `ClientError`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    handle: ConnectionHandle,
}

impl CommandExecutor {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Stores `value` under `key`. A `ttl_millis` of zero or less stores it without expiry.
    pub async fn set(&self, key: &str, value: &str, ttl_millis: i64) -> CommandResult<()> {
        let connection = self.handle.connection()?;
        connection
            .set(key, value, ttl_from_millis(ttl_millis))
            .await
            .map_err(|e| command_failed("SET", e))
    }

    /// Returns `Ok(None)` for a missing or expired key.
    pub async fn get(&self, key: &str) -> CommandResult<Option<String>> {
        let connection = self.handle.connection()?;
        connection
            .get(key)
            .await
            .map_err(|e| command_failed("GET", e))
    }

    /// Deleting a missing key is not an error.
    pub async fn delete(&self, key: &str) -> CommandResult<()> {
        let connection = self.handle.connection()?;
        let removed = connection
            .del(key)
            .await
            .map_err(|e| command_failed("DEL", e))?;
        debug!("DEL '{}' removed {} key(s).", key, removed);
        Ok(())
    }

    /// Fire-and-forget: success means the store accepted the message, not that anyone received it.
    pub async fn publish(&self, channel: &str, message: &str) -> CommandResult<()> {
        let connection = self.handle.connection()?;
        let receivers = connection
            .publish(channel, message)
            .await
            .map_err(|e| command_failed("PUBLISH", e))?;
        debug!("Published to '{}' ({} receiver(s)).", channel, receivers);
        Ok(())
    }
}

/// Negative values clamp to zero, and zero means no expiry.
pub fn ttl_from_millis(ttl_millis: i64) -> Option<Duration> {
    u64::try_from(ttl_millis)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn command_failed(command: &str, err: crate::core::errors::TransportError) -> ClientError {
    debug!("{} failed: {}", command, err);
    ClientError::from_command(err)
}
