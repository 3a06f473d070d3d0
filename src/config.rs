// src/config.rs

//! Client configuration: loading from TOML, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// The options used to open a connection. A copy is frozen into every
/// `ConnectionHandle`, so later edits never affect a live connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    /// An empty password disables `AUTH`.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: u32,
    /// Upper bound on pooled command connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How long a command waits for a free pooled connection.
    #[serde(with = "humantime_serde", default = "default_wait_timeout")]
    pub wait_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}
fn default_user() -> String {
    "default".to_string()
}
fn default_pool_size() -> usize {
    3
}
fn default_wait_timeout() -> Duration {
    Duration::from_millis(100)
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}
fn default_command_timeout() -> Duration {
    Duration::from_secs(3)
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            db: 0,
            pool_size: default_pool_size(),
            wait_timeout: default_wait_timeout(),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    /// The `host:port` string handed to the socket layer.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("connection.host cannot be empty"));
        }
        if self.port == 0 {
            return Err(anyhow!("connection.port cannot be 0"));
        }
        if self.pool_size == 0 {
            return Err(anyhow!("connection.pool_size cannot be 0"));
        }
        if self.wait_timeout.is_zero() {
            return Err(anyhow!("connection.wait_timeout cannot be 0"));
        }
        if self.pool_size > 16 {
            warn!(
                "connection.pool_size is {}; the client is designed around a small pool.",
                self.pool_size
            );
        }
        Ok(())
    }
}

/// Settings for the background subscriber.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// Channels the binary subscribes to on startup.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Delay before the first resubscribe after a failure. Zero retries immediately.
    #[serde(with = "humantime_serde", default = "default_reconnect_initial_delay")]
    pub reconnect_initial_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: Duration,
    /// How long `stop` waits for the worker task before aborting it.
    #[serde(with = "humantime_serde", default = "default_stop_timeout")]
    pub stop_timeout: Duration,
}

fn default_reconnect_initial_delay() -> Duration {
    Duration::from_millis(50)
}
fn default_reconnect_max_delay() -> Duration {
    Duration::from_secs(2)
}
fn default_stop_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            reconnect_initial_delay: default_reconnect_initial_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

impl SubscriberConfig {
    fn validate(&self) -> Result<()> {
        if self.reconnect_max_delay < self.reconnect_initial_delay {
            return Err(anyhow!(
                "subscriber.reconnect_max_delay must not be smaller than subscriber.reconnect_initial_delay"
            ));
        }
        if self.stop_timeout.is_zero() {
            return Err(anyhow!("subscriber.stop_timeout cannot be 0"));
        }
        Ok(())
    }
}

/// The complete client configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub subscriber: SubscriberConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connection: ConnectionConfig::default(),
            subscriber: SubscriberConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Reads, parses, and validates a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{}'", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{}'", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        self.subscriber.validate()?;
        Ok(())
    }
}
