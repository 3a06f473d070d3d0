// src/core/transport/resp/mod.rs

//! RESP2-over-TCP transport: a bounded command pool plus one dedicated
//! connection per subscription.

use super::{Connection, Connector, Subscription};
use crate::config::ConnectionConfig;
use crate::core::errors::TransportError;
use crate::core::protocol::RespFrame;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod client;
pub mod pool;
pub mod subscription;

pub use client::RespClient;
pub use pool::ConnectionPool;
pub use subscription::RespSubscription;

use client::{expect_count, expect_ok};

/// Connects to a RESP server such as SpinelDB or Redis.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespConnector;

#[async_trait]
impl Connector for RespConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let pool = ConnectionPool::open(config.clone()).await?;
        debug!(
            "RESP pool to {} ready (size {}, wait timeout {:?}).",
            config.addr(),
            config.pool_size,
            config.wait_timeout
        );
        Ok(Arc::new(RespConnection {
            pool,
            config: config.clone(),
        }))
    }
}

pub struct RespConnection {
    pool: ConnectionPool,
    config: ConnectionConfig,
}

#[async_trait]
impl Connection for RespConnection {
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), TransportError> {
        let mut parts = vec!["SET".to_string(), key.to_string(), value.to_string()];
        if let Some(ttl) = ttl {
            parts.push("PX".to_string());
            parts.push(ttl.as_millis().max(1).to_string());
        }
        expect_ok(self.pool.execute(RespFrame::command(parts)).await?, "SET")
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        match self.pool.execute(RespFrame::command(["GET", key])).await? {
            RespFrame::BulkString(b) => Ok(Some(String::from_utf8_lossy(&b).into_owned())),
            RespFrame::Null => Ok(None),
            other => Err(TransportError::Protocol(format!(
                "Unexpected response to GET: {other:?}"
            ))),
        }
    }

    async fn del(&self, key: &str) -> Result<u64, TransportError> {
        expect_count(self.pool.execute(RespFrame::command(["DEL", key])).await?, "DEL")
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64, TransportError> {
        let frame = RespFrame::command(["PUBLISH", channel, message]);
        expect_count(self.pool.execute(frame).await?, "PUBLISH")
    }

    async fn subscriber(&self) -> Result<Box<dyn Subscription>, TransportError> {
        let client = RespClient::connect(&self.config).await?;
        Ok(Box::new(RespSubscription::new(client)))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let released = self.pool.close();
        debug!(
            "Closed RESP pool to {} ({} idle connections released).",
            self.config.addr(),
            released
        );
        Ok(())
    }
}
