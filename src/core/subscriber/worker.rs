// src/core/subscriber/worker.rs

//! Owns the background task that keeps a subscription alive and forwards its
//! messages to the host through a `CallbackDispatcher`.

use super::{RetryPolicy, SubscriberState, SubscriptionRequest};
use crate::config::SubscriberConfig;
use crate::core::dispatch::{CallbackDispatcher, HostSender};
use crate::core::errors::{ClientError, CommandResult, TransportError};
use crate::core::transport::{Connection, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Runs at most one subscription task at a time.
pub struct SubscriberWorker {
    host: HostSender,
    settings: SubscriberConfig,
    state: Arc<Mutex<SubscriberState>>,
    active: Option<ActiveWorker>,
}

/// The parts of a started worker that `stop` needs.
struct ActiveWorker {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    dispatcher: CallbackDispatcher,
    channels: Vec<String>,
}

impl SubscriberWorker {
    pub fn new(host: HostSender, settings: SubscriberConfig) -> Self {
        Self::with_shared_state(host, settings, Arc::new(Mutex::new(SubscriberState::Idle)))
    }

    /// Builds a worker that reports its state through a cell owned by the caller.
    pub(crate) fn with_shared_state(
        host: HostSender,
        settings: SubscriberConfig,
        state: Arc<Mutex<SubscriberState>>,
    ) -> Self {
        Self {
            host,
            settings,
            state,
            active: None,
        }
    }

    pub fn state(&self) -> SubscriberState {
        *self.state.lock()
    }

    /// The channels of the active subscription; empty once stopped.
    pub fn channels(&self) -> &[String] {
        match &self.active {
            Some(active) => &active.channels,
            None => &[],
        }
    }

    /// Spawns the subscription task and returns without waiting for it.
    ///
    /// Fails with `AlreadySubscribed` unless the worker is Idle or Stopped; the
    /// running task and its callback are left untouched in that case. Must be
    /// called from within a tokio runtime.
    pub fn start(
        &mut self,
        connection: Arc<dyn Connection>,
        request: SubscriptionRequest,
    ) -> CommandResult<()> {
        {
            let mut state = self.state.lock();
            if state.is_active() {
                return Err(ClientError::AlreadySubscribed);
            }
            *state = SubscriberState::Starting;
        }

        let (channels, callback) = request.into_parts();
        let dispatcher = CallbackDispatcher::new(self.host.clone(), callback);
        let (stop_tx, stop_rx) = watch::channel(false);

        let receive_loop = ReceiveLoop {
            connection,
            channels: channels.clone(),
            dispatcher: dispatcher.clone(),
            state: Arc::clone(&self.state),
            retry: RetryPolicy::from_config(&self.settings),
            stop_rx,
        };

        info!("Starting subscriber for channels {:?}.", channels);
        let task = tokio::spawn(receive_loop.run());

        self.active = Some(ActiveWorker {
            stop_tx,
            task,
            dispatcher,
            channels,
        });
        Ok(())
    }

    /// Signals the task to stop and waits for it to exit.
    ///
    /// The callback is unbound before the task is signalled, so no message is
    /// delivered once `stop` has begun. If the task does not exit within the
    /// configured `stop_timeout` it is aborted, and `stop` still waits for the
    /// task to be gone before returning. No-op when nothing is running.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        *self.state.lock() = SubscriberState::Stopping;
        active.dispatcher.retire();
        let _ = active.stop_tx.send(true);

        let mut task = active.task;
        match time::timeout(self.settings.stop_timeout, &mut task).await {
            Ok(Ok(())) => debug!("Subscriber task joined."),
            Ok(Err(e)) => warn!("Subscriber task ended abnormally: {}", e),
            Err(_) => {
                error!(
                    "Subscriber task did not exit within {:?}; aborting it.",
                    self.settings.stop_timeout
                );
                task.abort();
                // Abort lands at the task's next yield point; wait for it.
                match task.await {
                    Err(e) if e.is_cancelled() => debug!("Subscriber task cancelled."),
                    Err(e) => warn!("Subscriber task ended abnormally: {}", e),
                    Ok(()) => debug!("Subscriber task joined after abort."),
                }
            }
        }

        *self.state.lock() = SubscriberState::Stopped;
        info!("Subscriber for channels {:?} stopped.", active.channels);
    }
}

impl Drop for SubscriberWorker {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.dispatcher.retire();
            let _ = active.stop_tx.send(true);
            active.task.abort();
            *self.state.lock() = SubscriberState::Stopped;
        }
    }
}

/// How a consumed subscription ended.
enum Consumed {
    Stopped,
    Lost(TransportError),
}

/// The state moved into the spawned task.
struct ReceiveLoop {
    connection: Arc<dyn Connection>,
    channels: Vec<String>,
    dispatcher: CallbackDispatcher,
    state: Arc<Mutex<SubscriberState>>,
    retry: RetryPolicy,
    stop_rx: watch::Receiver<bool>,
}

impl ReceiveLoop {
    async fn run(mut self) {
        let mut delay = self.retry.initial_delay;

        loop {
            let opened = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => break,
                result = open_subscription(&self.connection, &self.channels) => result,
            };

            match opened {
                Ok(subscription) => {
                    self.mark_running();
                    delay = self.retry.initial_delay;
                    match self.consume(subscription).await {
                        Consumed::Stopped => break,
                        Consumed::Lost(e) => warn!(
                            "Subscription to {:?} lost: {}. Resubscribing in {:?}...",
                            self.channels, e, delay
                        ),
                    }
                }
                Err(e) => warn!(
                    "Failed to subscribe to {:?}: {}. Retrying in {:?}...",
                    self.channels, e, delay
                ),
            }

            if !self.backoff(delay).await {
                break;
            }
            delay = self.retry.next_delay(delay);
        }

        debug!("Receive loop for {:?} exited.", self.channels);
    }

    fn mark_running(&self) {
        let mut state = self.state.lock();
        if *state == SubscriberState::Starting {
            *state = SubscriberState::Running;
            info!("Subscribed to channels {:?}.", self.channels);
        } else {
            debug!("Resubscribed to channels {:?}.", self.channels);
        }
    }

    /// Forwards messages until the stop signal or a transport error.
    async fn consume(&mut self, mut subscription: Box<dyn Subscription>) -> Consumed {
        let outcome = loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => break Consumed::Stopped,
                result = subscription.next_message() => match result {
                    Ok(message) => {
                        debug!("Received message on '{}'.", message.channel);
                        self.dispatcher.deliver(&message.channel, &message.payload);
                    }
                    Err(e) => break Consumed::Lost(e),
                },
            }
        };

        if let Consumed::Stopped = outcome {
            if let Err(e) = subscription.close().await {
                debug!("Error while closing subscription: {}", e);
            }
        }
        outcome
    }

    /// Sleeps `delay` unless stopped first. Returns false if the loop should exit.
    async fn backoff(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return !*self.stop_rx.borrow();
        }
        tokio::select! {
            biased;
            _ = stop_requested(&mut self.stop_rx) => false,
            _ = time::sleep(delay) => true,
        }
    }
}

/// Opens a fresh subscription and subscribes it to every channel.
async fn open_subscription(
    connection: &Arc<dyn Connection>,
    channels: &[String],
) -> Result<Box<dyn Subscription>, TransportError> {
    let mut subscription = connection.subscriber().await?;
    for channel in channels {
        subscription.subscribe(channel).await?;
    }
    Ok(subscription)
}

/// Resolves once stop has been signalled or the worker has gone away.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}
