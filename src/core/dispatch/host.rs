// src/core/dispatch/host.rs

//! The host's single-threaded execution context.
//!
//! Any task may post a job through a `HostSender`; jobs only run when the host
//! pumps its `HostContext`, one at a time, in posting order.

use std::cell::Cell;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A unit of work scheduled onto the host context.
pub type HostJob = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static ON_HOST_CONTEXT: Cell<bool> = const { Cell::new(false) };
}

/// The receiving side of the host queue. Owned by the host's main loop.
pub struct HostContext {
    tx: mpsc::UnboundedSender<HostJob>,
    rx: mpsc::UnboundedReceiver<HostJob>,
}

/// A cloneable handle for posting jobs onto a `HostContext`.
#[derive(Clone)]
pub struct HostSender {
    tx: mpsc::UnboundedSender<HostJob>,
}

impl HostSender {
    /// Queues `job` without waiting. Returns false if the host context is gone.
    pub fn post(&self, job: HostJob) -> bool {
        self.tx.send(job).is_ok()
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HostContext {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> HostSender {
        HostSender {
            tx: self.tx.clone(),
        }
    }

    /// True while a job posted to a host context is running on this thread.
    pub fn is_current() -> bool {
        ON_HOST_CONTEXT.with(|flag| flag.get())
    }

    /// Runs every job queued so far and returns how many ran. Never waits.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for at least one job, then drains the queue.
    /// Returns how many jobs ran.
    pub async fn pump_wait(&mut self, timeout: Duration) -> usize {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(job)) => {
                run_job(job);
                1 + self.pump()
            }
            _ => 0,
        }
    }

    /// Pumps until `done` returns true or `timeout` elapses. Returns whether `done` was reached.
    pub async fn pump_until<F>(&mut self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.pump_wait(remaining).await;
        }
    }

    /// Runs jobs as they arrive for the whole of `duration`.
    pub async fn pump_for(&mut self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ran + self.pump();
            }
            ran += self.pump_wait(remaining).await;
        }
    }
}

fn run_job(job: HostJob) {
    let _marker = HostMarker::enter();
    job();
}

/// Sets `ON_HOST_CONTEXT` for its lifetime, including when a job panics.
struct HostMarker;

impl HostMarker {
    fn enter() -> Self {
        ON_HOST_CONTEXT.with(|flag| flag.set(true));
        HostMarker
    }
}

impl Drop for HostMarker {
    fn drop(&mut self) {
        ON_HOST_CONTEXT.with(|flag| flag.set(false));
    }
}
