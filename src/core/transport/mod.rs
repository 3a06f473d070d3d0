// src/core/transport/mod.rs

//! The seam between the managed client and the store it talks to.
//!
//! A `Connector` opens a `Connection`; a `Connection` executes commands and
//! hands out dedicated `Subscription`s. Two implementations ship with the crate:
//! - `resp`: RESP2 over TCP with a small bounded connection pool.
//! - `memory`: an in-process store with pub/sub and fault injection.

use crate::config::ConnectionConfig;
use crate::core::errors::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub mod resp;

pub use memory::{MemoryConnector, MemoryStore};
pub use resp::RespConnector;

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: String,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Opens connections to a store.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, config: &ConnectionConfig)
    -> Result<Arc<dyn Connection>, TransportError>;
}

/// A live connection (or pool of connections) to a store.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stores `value` under `key`. `None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
    -> Result<(), TransportError>;

    async fn get(&self, key: &str) -> Result<Option<String>, TransportError>;

    /// Returns the number of keys removed.
    async fn del(&self, key: &str) -> Result<u64, TransportError>;

    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, message: &str) -> Result<u64, TransportError>;

    /// Opens a fresh subscription that is independent of the command connections.
    async fn subscriber(&self) -> Result<Box<dyn Subscription>, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// A channel subscription owned by exactly one task.
#[async_trait]
pub trait Subscription: Send {
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Waits for the next message.
    ///
    /// Implementations must be cancel-safe: the subscriber worker races this
    /// future against its stop signal and drops it when stopping.
    async fn next_message(&mut self) -> Result<Message, TransportError>;

    /// Releases the subscription. Any later call fails with `TransportError::Closed`.
    async fn close(&mut self) -> Result<(), TransportError>;
}
