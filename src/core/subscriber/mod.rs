// src/core/subscriber/mod.rs

//! The background subscriber: its lifecycle state, the request it is started
//! with, and the retry policy of its receive loop.

use crate::config::SubscriberConfig;
use crate::core::dispatch::MessageCallback;
use crate::core::errors::{ClientError, CommandResult};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod worker;

pub use worker::SubscriberWorker;

/// The lifecycle of a `SubscriberWorker` as seen by the host.
///
/// Reconnects inside the receive loop do not change the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SubscriberState {
    /// True while a worker task owns the subscription slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SubscriberState::Starting | SubscriberState::Running | SubscriberState::Stopping
        )
    }
}

impl fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriberState::Idle => "idle",
            SubscriberState::Starting => "starting",
            SubscriberState::Running => "running",
            SubscriberState::Stopping => "stopping",
            SubscriberState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The channels to subscribe to and the callback that receives their messages.
#[derive(Clone)]
pub struct SubscriptionRequest {
    channels: Vec<String>,
    callback: MessageCallback,
}

impl SubscriptionRequest {
    /// Builds a request. Duplicate channels are collapsed, keeping the first
    /// occurrence; an empty channel list is rejected.
    pub fn new<I, S, F>(channels: I, callback: F) -> CommandResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        Self::with_callback(channels, Arc::new(callback))
    }

    pub fn with_callback<I, S>(channels: I, callback: MessageCallback) -> CommandResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for channel in channels {
            let channel = channel.into();
            if !unique.contains(&channel) {
                unique.push(channel);
            }
        }
        if unique.is_empty() {
            return Err(ClientError::Command(
                "at least one channel is required to subscribe".to_string(),
            ));
        }
        Ok(Self {
            channels: unique,
            callback,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, MessageCallback) {
        (self.channels, self.callback)
    }
}

impl fmt::Debug for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRequest")
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// Capped exponential backoff between resubscribe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SubscriberConfig) -> Self {
        Self {
            initial_delay: config.reconnect_initial_delay,
            max_delay: config.reconnect_max_delay,
        }
    }

    /// The delay to use after `current`. A zero delay stays zero.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SubscriberConfig::default())
    }
}
