// src/core/transport/memory.rs

//! An in-process store implementing the transport traits.
//!
//! It keeps a keyspace per database index, a broadcast-based pub/sub hub, and
//! optional user credentials. It also exposes fault injection (unreachable
//! host, failing subscriptions, severing live subscriptions) and counters that
//! let callers observe the connection lifecycle from the store's side.

use super::{Connection, Connector, Message, Subscription};
use crate::config::ConnectionConfig;
use crate::core::errors::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::debug;

/// The capacity of each individual broadcast channel.
const CHANNEL_CAPACITY: usize = 128;
/// Number of logical databases, matching the usual server default.
const DATABASES: u32 = 16;

/// Channel-to-sender map backing the in-process pub/sub.
#[derive(Debug, Default)]
pub struct PubSubHub {
    channels: DashMap<String, Arc<broadcast::Sender<String>>>,
}

impl PubSubHub {
    /// Returns a receiver for `channel`, creating the channel on first use.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(broadcast::channel(CHANNEL_CAPACITY).0))
            .value()
            .subscribe()
    }

    /// Returns the number of receivers the message was sent to.
    pub fn publish(&self, channel: &str, message: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |sender| sender.send(message.to_string()).unwrap_or(0))
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Removes channels that no longer have any receivers.
    pub fn purge_empty_channels(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        let purged = before.saturating_sub(self.channels.len());
        if purged > 0 {
            debug!("Purged {} empty pub/sub channels.", purged);
        }
        purged
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// The shared state of the in-process store.
#[derive(Debug)]
pub struct MemoryStore {
    keys: DashMap<(u32, String), StoredValue>,
    pubsub: PubSubHub,
    users: DashMap<String, String>,
    reachable: AtomicBool,
    pending_subscribe_failures: AtomicUsize,
    sever_tx: broadcast::Sender<()>,
    next_connection_id: AtomicU64,
    open_connections: AtomicUsize,
    open_subscriptions: AtomicUsize,
    subscriptions_opened: AtomicUsize,
    subscriptions_at_close: Mutex<Vec<usize>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            keys: DashMap::new(),
            pubsub: PubSubHub::default(),
            users: DashMap::new(),
            reachable: AtomicBool::new(true),
            pending_subscribe_failures: AtomicUsize::new(0),
            sever_tx: broadcast::channel(1).0,
            next_connection_id: AtomicU64::new(1),
            open_connections: AtomicUsize::new(0),
            open_subscriptions: AtomicUsize::new(0),
            subscriptions_opened: AtomicUsize::new(0),
            subscriptions_at_close: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `user`/`password` on connect. Without any user, every login is accepted.
    pub fn add_user(&self, user: impl Into<String>, password: impl Into<String>) {
        self.users.insert(user.into(), password.into());
    }

    /// When false, new connections are refused like an unreachable host.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `Connection::subscriber` fail.
    pub fn fail_next_subscriptions(&self, count: usize) {
        self.pending_subscribe_failures
            .store(count, Ordering::SeqCst);
    }

    /// Breaks every live subscription, as a dropped server link would.
    /// Returns the number of subscriptions that were severed.
    pub fn sever_subscriptions(&self) -> usize {
        self.sever_tx.send(()).unwrap_or(0)
    }

    /// Publishes from outside any connection.
    pub fn publish(&self, channel: &str, message: &str) -> usize {
        self.pubsub.publish(channel, message)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.pubsub.subscriber_count(channel)
    }

    pub fn purge_empty_channels(&self) -> usize {
        self.pubsub.purge_empty_channels()
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    pub fn open_subscriptions(&self) -> usize {
        self.open_subscriptions.load(Ordering::SeqCst)
    }

    /// Total subscriptions ever opened, including retries.
    pub fn subscriptions_opened(&self) -> usize {
        self.subscriptions_opened.load(Ordering::SeqCst)
    }

    /// For every closed connection, the number of subscriptions still open at the moment it closed.
    pub fn subscriptions_at_close(&self) -> Vec<usize> {
        self.subscriptions_at_close.lock().clone()
    }

    fn authenticate(&self, config: &ConnectionConfig) -> Result<(), TransportError> {
        if self.users.is_empty() {
            return Ok(());
        }
        match self.users.get(&config.user) {
            Some(password) if *password == config.password => Ok(()),
            _ => Err(TransportError::Server(
                "WRONGPASS invalid username-password pair or user is disabled.".to_string(),
            )),
        }
    }
}

/// A `Connector` handing out connections to a shared `MemoryStore`.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        if !self.store.reachable.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("Failed to connect to {}: Connection refused", config.addr()),
            )
            .into());
        }
        self.store.authenticate(config)?;
        if config.db >= DATABASES {
            return Err(TransportError::Server(
                "ERR DB index is out of range".to_string(),
            ));
        }

        let id = self.store.next_connection_id.fetch_add(1, Ordering::SeqCst);
        self.store.open_connections.fetch_add(1, Ordering::SeqCst);
        debug!("Opened in-memory connection #{} (db {}).", id, config.db);
        Ok(Arc::new(MemoryConnection {
            id,
            db: config.db,
            store: self.store.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A connection to a `MemoryStore`, scoped to one database index.
pub struct MemoryConnection {
    id: u64,
    db: u32,
    store: Arc<MemoryStore>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.store.keys.insert(
            (self.db, key.to_string()),
            StoredValue {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        self.ensure_open()?;
        let key = (self.db, key.to_string());
        match self.store.keys.get(&key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // Lazily drop the expired entry.
        self.store.keys.remove_if(&key, |_, v| v.is_expired());
        Ok(None)
    }

    async fn del(&self, key: &str) -> Result<u64, TransportError> {
        self.ensure_open()?;
        let removed = self
            .store
            .keys
            .remove(&(self.db, key.to_string()))
            .filter(|(_, v)| !v.is_expired());
        Ok(u64::from(removed.is_some()))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<u64, TransportError> {
        self.ensure_open()?;
        Ok(self.store.pubsub.publish(channel, message) as u64)
    }

    async fn subscriber(&self) -> Result<Box<dyn Subscription>, TransportError> {
        self.ensure_open()?;
        let injected = self
            .store
            .pending_subscribe_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "subscription connection reset by peer",
            )
            .into());
        }
        Ok(Box::new(MemorySubscription::new(self.store.clone())))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let open_subscriptions = self.store.open_subscriptions();
        self.store
            .subscriptions_at_close
            .lock()
            .push(open_subscriptions);
        self.store.open_connections.fetch_sub(1, Ordering::SeqCst);
        debug!("Closed in-memory connection #{}.", self.id);
        Ok(())
    }
}

/// A subscription on a `MemoryStore`.
pub struct MemorySubscription {
    store: Arc<MemoryStore>,
    receivers: Vec<(String, broadcast::Receiver<String>)>,
    sever_rx: broadcast::Receiver<()>,
    closed: bool,
}

impl MemorySubscription {
    fn new(store: Arc<MemoryStore>) -> Self {
        store.open_subscriptions.fetch_add(1, Ordering::SeqCst);
        store.subscriptions_opened.fetch_add(1, Ordering::SeqCst);
        let sever_rx = store.sever_tx.subscribe();
        Self {
            store,
            receivers: Vec::new(),
            sever_rx,
            closed: false,
        }
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.receivers.clear();
            self.store.open_subscriptions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.receivers.iter().any(|(name, _)| name == channel) {
            return Ok(());
        }
        let rx = self.store.pubsub.subscribe(channel);
        self.receivers.push((channel.to_string(), rx));
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Message, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            _ = self.sever_rx.recv() => Err(TransportError::from(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "subscription severed by the store",
            ))),
            result = receive_any(&mut self.receivers) => result,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.release();
        Ok(())
    }
}

/// Waits for a message on any of the subscribed channels.
async fn receive_any(
    receivers: &mut [(String, broadcast::Receiver<String>)],
) -> Result<Message, TransportError> {
    if receivers.is_empty() {
        return futures::future::pending().await;
    }

    let futures = receivers.iter_mut().map(|(channel, rx)| {
        async move {
            rx.recv()
                .await
                .map(|payload| Message::new(channel.clone(), payload))
        }
        .boxed()
    });
    let (result, _index, _remaining) = futures::future::select_all(futures).await;

    match result {
        Ok(message) => Ok(message),
        Err(RecvError::Lagged(missed)) => Err(TransportError::Protocol(format!(
            "subscriber lagged behind by {missed} messages"
        ))),
        Err(RecvError::Closed) => Err(TransportError::Closed),
    }
}
