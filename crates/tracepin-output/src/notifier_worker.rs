//! Probe notifier worker
//!
//! Buffers status and snapshot payloads produced on the instrumented call path
//! and flushes them to the transport from a single background task.
//!
//! Producers never block: both queues are bounded and a full queue drops the
//! incoming payload. Flushes happen at most once per `min_send_interval`, or
//! on demand via [`ProbeNotifierWorker::flush`].

use crate::shutdown::GracefulShutdownHandle;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracepin_config::NotifierConfig;
use tracepin_core::{Error, Result, SnapshotPayload, StatusPayload};
use tracepin_ports::NotifierTransportRef;
use tracing::{debug, info, warn};

/// Resolved worker settings
#[derive(Debug, Clone)]
pub struct NotifierWorkerConfig {
    pub min_send_interval: Duration,
    pub snapshot_queue_capacity: usize,
    pub status_queue_capacity: usize,
    pub transport_timeout: Duration,
    pub stop_timeout: Duration,
}

impl NotifierWorkerConfig {
    pub fn from_settings(settings: &NotifierConfig) -> Self {
        Self {
            min_send_interval: settings.min_send_interval(),
            snapshot_queue_capacity: settings.snapshot_queue_capacity,
            status_queue_capacity: settings.status_queue_capacity,
            transport_timeout: settings.transport_timeout(),
            stop_timeout: settings.stop_timeout(),
        }
    }
}

impl Default for NotifierWorkerConfig {
    fn default() -> Self {
        Self::from_settings(&NotifierConfig::default())
    }
}

/// Point-in-time worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    pub statuses_sent: u64,
    pub snapshots_sent: u64,
    pub batches_sent: u64,
    pub statuses_dropped: u64,
    pub snapshots_dropped: u64,
    pub send_failures: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| {
        warn!("Notifier queue lock was poisoned, recovering");
        e.into_inner()
    })
}

struct WorkerState {
    config: NotifierWorkerConfig,
    transport: NotifierTransportRef,
    statuses: Mutex<VecDeque<StatusPayload>>,
    snapshots: Mutex<VecDeque<SnapshotPayload>>,
    accepting: AtomicBool,
    /// Serializes flushes between the background loop and explicit callers
    send_lock: tokio::sync::Mutex<()>,
    statuses_sent: AtomicU64,
    snapshots_sent: AtomicU64,
    batches_sent: AtomicU64,
    statuses_dropped: AtomicU64,
    snapshots_dropped: AtomicU64,
    send_failures: AtomicU64,
}

impl WorkerState {
    fn enqueue<T>(
        &self,
        queue: &Mutex<VecDeque<T>>,
        capacity: usize,
        dropped: &AtomicU64,
        kind: &str,
        payload: T,
    ) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            dropped.fetch_add(1, Ordering::Relaxed);
            debug!(kind, "Notifier stopped, dropping payload");
            return false;
        }
        let mut queue = lock(queue);
        if queue.len() >= capacity {
            drop(queue);
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(kind, capacity, dropped = total, "Notifier queue full, dropping payload");
            return false;
        }
        queue.push_back(payload);
        true
    }

    /// Put unsent payloads back ahead of anything queued meanwhile
    fn requeue<T>(
        queue: &Mutex<VecDeque<T>>,
        capacity: usize,
        dropped: &AtomicU64,
        unsent: Vec<T>,
    ) {
        let mut queue = lock(queue);
        let mut merged: VecDeque<T> = unsent.into();
        merged.extend(queue.drain(..));
        if merged.len() > capacity {
            let overflow = merged.len() - capacity;
            merged.truncate(capacity);
            dropped.fetch_add(overflow as u64, Ordering::Relaxed);
        }
        *queue = merged;
    }

    async fn send_with_timeout<F>(&self, send: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match tokio::time::timeout(self.config.transport_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(Error::agent_communication(format!(
                "{} transport timed out after {}ms",
                self.transport.name(),
                self.config.transport_timeout.as_millis()
            ))),
        }
    }

    async fn flush(&self) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        self.flush_statuses().await?;
        self.flush_snapshots().await
    }

    async fn flush_statuses(&self) -> Result<()> {
        let pending: Vec<StatusPayload> = std::mem::take(&mut *lock(&self.statuses)).into();
        let mut sent = 0;
        while sent < pending.len() {
            let result = self
                .send_with_timeout(self.transport.send_status(&pending[sent]))
                .await;
            if let Err(e) = result {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    transport = self.transport.name(),
                    error = %e,
                    remaining = pending.len() - sent,
                    "Failed to send probe status, will retry"
                );
                let unsent = pending.into_iter().skip(sent).collect();
                Self::requeue(
                    &self.statuses,
                    self.config.status_queue_capacity,
                    &self.statuses_dropped,
                    unsent,
                );
                return Err(e);
            }
            sent += 1;
        }
        self.statuses_sent.fetch_add(sent as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn flush_snapshots(&self) -> Result<()> {
        let batch: Vec<SnapshotPayload> = std::mem::take(&mut *lock(&self.snapshots)).into();
        if batch.is_empty() {
            return Ok(());
        }

        match self
            .send_with_timeout(self.transport.send_snapshot_batch(&batch))
            .await
        {
            Ok(()) => {
                self.batches_sent.fetch_add(1, Ordering::Relaxed);
                self.snapshots_sent
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(count = batch.len(), "Sent snapshot batch");
                Ok(())
            }
            Err(e) => {
                self.send_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    transport = self.transport.name(),
                    error = %e,
                    count = batch.len(),
                    "Failed to send snapshot batch, will retry"
                );
                Self::requeue(
                    &self.snapshots,
                    self.config.snapshot_queue_capacity,
                    &self.snapshots_dropped,
                    batch,
                );
                Err(e)
            }
        }
    }
}

/// Background batching sender for probe notifications
pub struct ProbeNotifierWorker {
    state: Arc<WorkerState>,
    shutdown: Mutex<Option<GracefulShutdownHandle>>,
}

impl ProbeNotifierWorker {
    pub fn new(config: NotifierWorkerConfig, transport: NotifierTransportRef) -> Self {
        Self {
            state: Arc::new(WorkerState {
                config,
                transport,
                statuses: Mutex::new(VecDeque::new()),
                snapshots: Mutex::new(VecDeque::new()),
                accepting: AtomicBool::new(true),
                send_lock: tokio::sync::Mutex::new(()),
                statuses_sent: AtomicU64::new(0),
                snapshots_sent: AtomicU64::new(0),
                batches_sent: AtomicU64::new(0),
                statuses_dropped: AtomicU64::new(0),
                snapshots_dropped: AtomicU64::new(0),
                send_failures: AtomicU64::new(0),
            }),
            shutdown: Mutex::new(None),
        }
    }

    /// Queue a status payload. Returns false when it was dropped.
    pub fn add_status(&self, payload: StatusPayload) -> bool {
        let state = &self.state;
        state.enqueue(
            &state.statuses,
            state.config.status_queue_capacity,
            &state.statuses_dropped,
            "status",
            payload,
        )
    }

    /// Queue a snapshot payload. Returns false when it was dropped.
    pub fn add_snapshot(&self, payload: SnapshotPayload) -> bool {
        let state = &self.state;
        state.enqueue(
            &state.snapshots,
            state.config.snapshot_queue_capacity,
            &state.snapshots_dropped,
            "snapshot",
            payload,
        )
    }

    /// Send everything queued right now: statuses one by one, then all
    /// snapshots as a single batch. Unsent payloads stay queued.
    pub async fn flush(&self) -> Result<()> {
        self.state.flush().await
    }

    /// Spawn the background loop on the current tokio runtime.
    ///
    /// Returns false when already running or when called outside a runtime.
    pub fn start(&self) -> bool {
        let mut slot = lock(&self.shutdown);
        if slot.as_ref().is_some_and(|h| h.is_running()) {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Notifier worker needs a tokio runtime, not started");
            return false;
        };

        let (mut handle, mut shutdown_rx) =
            GracefulShutdownHandle::new(self.state.config.stop_timeout, "probe-notifier");
        let state = Arc::clone(&self.state);
        state.accepting.store(true, Ordering::Release);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(state.config.min_send_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.wait_for_shutdown() => {
                        let _ = state.flush().await;
                        break;
                    }
                    _ = ticker.tick() => {
                        // Failures are logged and retried next tick
                        let _ = state.flush().await;
                    }
                }
            }
            debug!("Notifier loop exited");
        });
        handle.set_task(task);
        *slot = Some(handle);

        info!(
            interval_ms = self.state.config.min_send_interval.as_millis() as u64,
            transport = self.state.transport.name(),
            "Probe notifier started"
        );
        true
    }

    /// Stop accepting payloads and stop the background loop.
    ///
    /// The loop gets one final flush, bounded by the stop timeout. Safe to
    /// call repeatedly or without a prior `start`.
    pub async fn stop(&self) {
        self.state.accepting.store(false, Ordering::Release);
        let handle = lock(&self.shutdown).take();
        let Some(mut handle) = handle else {
            return;
        };
        if handle.shutdown().await {
            info!("Probe notifier stopped");
        } else {
            warn!("Probe notifier did not stop in time, aborted");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shutdown).as_ref().is_some_and(|h| h.is_running())
    }

    pub fn is_accepting(&self) -> bool {
        self.state.accepting.load(Ordering::Acquire)
    }

    pub fn queued_statuses(&self) -> usize {
        lock(&self.state.statuses).len()
    }

    pub fn queued_snapshots(&self) -> usize {
        lock(&self.state.snapshots).len()
    }

    pub fn stats(&self) -> NotifierStats {
        let s = &self.state;
        NotifierStats {
            statuses_sent: s.statuses_sent.load(Ordering::Relaxed),
            snapshots_sent: s.snapshots_sent.load(Ordering::Relaxed),
            batches_sent: s.batches_sent.load(Ordering::Relaxed),
            statuses_dropped: s.statuses_dropped.load(Ordering::Relaxed),
            snapshots_dropped: s.snapshots_dropped.load(Ordering::Relaxed),
            send_failures: s.send_failures.load(Ordering::Relaxed),
        }
    }
}
