// src/core/connection/manager.rs

//! Owns the one live connection of a client instance and everything bound to it.

use super::handle::ConnectionHandle;
use crate::config::{ConnectionConfig, SubscriberConfig};
use crate::core::dispatch::HostSender;
use crate::core::errors::{ClientError, CommandResult};
use crate::core::executor::CommandExecutor;
use crate::core::subscriber::{SubscriberState, SubscriberWorker, SubscriptionRequest};
use crate::core::transport::Connector;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// The resources that exist only while connected.
struct ActiveConnection {
    handle: ConnectionHandle,
    executor: CommandExecutor,
    worker: SubscriberWorker,
}

/// Manages the connect/disconnect lifecycle of one client instance.
///
/// At most one connection exists per manager. Every host-facing operation is
/// routed through here and fails with `NotConnected` while disconnected.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    host: HostSender,
    subscriber_config: SubscriberConfig,
    next_handle_id: AtomicU64,
    subscriber_state: Arc<Mutex<SubscriberState>>,
    inner: AsyncMutex<Option<ActiveConnection>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager. Callbacks of its subscriptions are
    /// posted to the host context behind `host`.
    pub fn new(connector: impl Connector, host: HostSender) -> Self {
        Self {
            connector: Arc::new(connector),
            host,
            subscriber_config: SubscriberConfig::default(),
            next_handle_id: AtomicU64::new(1),
            subscriber_state: Arc::new(Mutex::new(SubscriberState::Idle)),
            inner: AsyncMutex::new(None),
        }
    }

    /// Overrides the retry and stop settings used by future subscriptions.
    pub fn with_subscriber_config(mut self, config: SubscriberConfig) -> Self {
        self.subscriber_config = config;
        self
    }

    /// Opens a connection, replacing any existing one.
    ///
    /// The previous connection is fully torn down before the new one is
    /// attempted, so a failed reconnect leaves the manager disconnected.
    pub async fn connect(&self, config: ConnectionConfig) -> CommandResult<ConnectionHandle> {
        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.take() {
            info!(
                "Replacing connection #{} to {}.",
                previous.handle.id(),
                previous.handle.config().addr()
            );
            self.teardown(previous).await;
        }

        let connection = self.connector.connect(&config).await.map_err(|e| {
            warn!("Failed to connect to {}: {}", config.addr(), e);
            ClientError::from_connect(e)
        })?;

        let id = self.next_handle_id.fetch_add(1, Ordering::SeqCst);
        info!("Connected to {} (db {}) as connection #{}.", config.addr(), config.db, id);
        let handle = ConnectionHandle::new(id, config, connection);

        *self.subscriber_state.lock() = SubscriberState::Idle;
        let worker = SubscriberWorker::with_shared_state(
            self.host.clone(),
            self.subscriber_config.clone(),
            Arc::clone(&self.subscriber_state),
        );

        *inner = Some(ActiveConnection {
            handle: handle.clone(),
            executor: CommandExecutor::new(handle.clone()),
            worker,
        });
        Ok(handle)
    }

    /// Tears down the current connection. Safe to call when not connected.
    ///
    /// Returns false only if closing the transport reported an error; the
    /// manager is disconnected either way.
    pub async fn disconnect(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.take() {
            Some(active) => self.teardown(active).await,
            None => {
                debug!("Disconnect requested while not connected.");
                true
            }
        }
    }

    /// Releases the connection at the end of a host session. Idempotent.
    pub async fn clear_connection(&self) {
        if !self.disconnect().await {
            debug!("Session cleanup finished with a transport close error.");
        }
    }

    /// Stop the worker, drop the executor, invalidate the handle, then close the transport.
    async fn teardown(&self, active: ActiveConnection) -> bool {
        let ActiveConnection {
            handle,
            executor,
            mut worker,
        } = active;

        worker.stop().await;
        drop(worker);
        *self.subscriber_state.lock() = SubscriberState::Stopped;
        drop(executor);

        handle.invalidate();
        let closed = match handle.transport().close().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error while closing connection #{}: {}", handle.id(), e);
                false
            }
        };
        info!("Disconnected connection #{}.", handle.id());
        closed
    }

    /// A clone of the current connection's executor; the lock is not held while commands run.
    async fn executor(&self) -> CommandResult<CommandExecutor> {
        let inner = self.inner.lock().await;
        inner
            .as_ref()
            .map(|active| active.executor.clone())
            .ok_or(ClientError::NotConnected)
    }

    pub async fn set(&self, key: &str, value: &str, ttl_millis: i64) -> CommandResult<()> {
        self.executor().await?.set(key, value, ttl_millis).await
    }

    pub async fn get(&self, key: &str) -> CommandResult<Option<String>> {
        self.executor().await?.get(key).await
    }

    pub async fn delete(&self, key: &str) -> CommandResult<()> {
        self.executor().await?.delete(key).await
    }

    pub async fn publish(&self, channel: &str, message: &str) -> CommandResult<()> {
        self.executor().await?.publish(channel, message).await
    }

    /// Starts the background subscriber for `channels`.
    ///
    /// Returns as soon as the worker is spawned; messages are delivered to
    /// `callback` when the host pumps its `HostContext`.
    pub async fn subscribe<I, S, F>(&self, channels: I, callback: F) -> CommandResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        let request = SubscriptionRequest::new(channels, callback)?;
        self.start_subscriber(request).await
    }

    pub async fn start_subscriber(&self, request: SubscriptionRequest) -> CommandResult<()> {
        let mut inner = self.inner.lock().await;
        let active = inner.as_mut().ok_or(ClientError::NotConnected)?;
        let connection = Arc::clone(active.handle.connection()?);
        active.worker.start(connection, request)
    }

    /// Stops the background subscriber and waits for it to exit. The
    /// connection stays open, and a new subscription may be started afterwards.
    pub async fn unsubscribe(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.as_mut() {
            active.worker.stop().await;
        }
    }

    pub fn subscriber_state(&self) -> SubscriberState {
        *self.subscriber_state.lock()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// The handle of the current connection, if any.
    pub async fn handle(&self) -> Option<ConnectionHandle> {
        self.inner
            .lock()
            .await
            .as_ref()
            .map(|active| active.handle.clone())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The worker's own drop aborts its task; closing the transport needs an await.
        if let Some(active) = self.inner.get_mut().take() {
            active.handle.invalidate();
            debug!(
                "Manager dropped while connection #{} was open; transport close skipped.",
                active.handle.id()
            );
        }
    }
}
