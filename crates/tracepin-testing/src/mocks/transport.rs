//! Recording notifier transport

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracepin_core::{Error, Result, SnapshotPayload, StatusPayload};
use tracepin_ports::NotifierTransport;

/// Transport that records everything it is asked to send.
///
/// Failures and delays can be injected to exercise the worker's retry and
/// timeout paths.
#[derive(Default)]
pub struct MockTransport {
    statuses: Mutex<Vec<StatusPayload>>,
    batches: Mutex<Vec<Vec<SnapshotPayload>>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    attempts: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail with a communication error until cleared
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every send by `delay` before recording it
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Total send calls, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<StatusPayload> {
        lock(&self.statuses).clone()
    }

    pub fn status_messages(&self) -> Vec<String> {
        lock(&self.statuses)
            .iter()
            .map(|s| s.message.clone())
            .collect()
    }

    pub fn batches(&self) -> Vec<Vec<SnapshotPayload>> {
        lock(&self.batches).clone()
    }

    /// All snapshots across batches, in send order
    pub fn snapshots(&self) -> Vec<SnapshotPayload> {
        lock(&self.batches).iter().flatten().cloned().collect()
    }

    async fn before_send(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::agent_communication("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl NotifierTransport for MockTransport {
    async fn send_status(&self, payload: &StatusPayload) -> Result<()> {
        self.before_send().await?;
        lock(&self.statuses).push(payload.clone());
        Ok(())
    }

    async fn send_snapshot_batch(&self, payloads: &[SnapshotPayload]) -> Result<()> {
        self.before_send().await?;
        lock(&self.batches).push(payloads.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
