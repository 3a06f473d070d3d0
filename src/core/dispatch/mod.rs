// src/core/dispatch/mod.rs

//! Marshals subscription messages from the worker task onto the host context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

pub mod host;

pub use host::{HostContext, HostJob, HostSender};

/// The host callback, invoked as `callback(channel, message)`.
pub type MessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync + 'static>;

/// Posts one job per delivered message onto the host queue.
///
/// The callback itself only ever runs inside `HostContext::pump*`. Once the
/// dispatcher is retired, jobs that are still queued find the callback
/// unbound and do nothing.
#[derive(Clone)]
pub struct CallbackDispatcher {
    host: HostSender,
    callback: MessageCallback,
    bound: Arc<AtomicBool>,
}

impl CallbackDispatcher {
    pub fn new(host: HostSender, callback: MessageCallback) -> Self {
        Self {
            host,
            callback,
            bound: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Queues `callback(channel, payload)` on the host context. Never waits.
    ///
    /// Returns false if the dispatcher is retired or the host context is gone.
    pub fn deliver(&self, channel: &str, payload: &str) -> bool {
        if !self.is_bound() {
            return false;
        }

        let callback = Arc::clone(&self.callback);
        let bound = Arc::clone(&self.bound);
        let channel = channel.to_string();
        let payload = payload.to_string();

        let posted = self.host.post(Box::new(move || {
            if bound.load(Ordering::SeqCst) {
                callback(&channel, &payload);
            } else {
                trace!("Dropped message for '{}': callback no longer bound.", channel);
            }
        }));

        if !posted {
            debug!("Host context is gone; message discarded.");
        }
        posted
    }

    /// Unbinds the callback. Already-queued jobs become no-ops.
    pub fn retire(&self) {
        self.bound.store(false, Ordering::SeqCst);
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }
}
