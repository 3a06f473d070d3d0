// src/core/transport/resp/pool.rs

//! A small, bounded pool of command connections.
//!
//! At most `pool_size` connections exist. A command waits at most
//! `wait_timeout` for a free slot, so contention turns into a fast
//! `PoolTimeout` instead of an unbounded stall.

use super::client::RespClient;
use crate::config::ConnectionConfig;
use crate::core::errors::TransportError;
use crate::core::protocol::RespFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Debug)]
pub struct ConnectionPool {
    config: ConnectionConfig,
    idle: Mutex<Vec<RespClient>>,
    permits: Semaphore,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Opens the first connection eagerly so that an unreachable host or bad
    /// credentials fail here rather than on the first command.
    pub async fn open(config: ConnectionConfig) -> Result<Self, TransportError> {
        let first = RespClient::connect(&config).await?;
        let size = config.pool_size.max(1);
        Ok(Self {
            idle: Mutex::new(vec![first]),
            permits: Semaphore::new(size),
            closed: AtomicBool::new(false),
            config,
        })
    }

    /// Runs one command on a pooled connection.
    ///
    /// A connection that failed at the I/O level is dropped rather than
    /// returned, since its stream may hold a half-read reply.
    pub async fn execute(&self, frame: RespFrame) -> Result<RespFrame, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let _permit = match tokio::time::timeout(self.config.wait_timeout, self.permits.acquire())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => return Err(TransportError::PoolTimeout(self.config.wait_timeout)),
        };

        let idle = self.idle.lock().pop();
        let mut client = match idle {
            Some(client) => client,
            None => RespClient::connect(&self.config).await?,
        };

        match client.request(frame).await {
            Ok(reply) => {
                if !self.closed.load(Ordering::SeqCst) {
                    self.idle.lock().push(client);
                }
                reply.into_result()
            }
            Err(e) => {
                debug!("Discarding pooled connection after error: {}", e);
                Err(e)
            }
        }
    }

    /// Refuses further commands and drops idle connections. Returns how many were dropped.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        let mut idle = self.idle.lock();
        let released = idle.len();
        idle.clear();
        released
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }
}
