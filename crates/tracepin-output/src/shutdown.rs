//! Bounded shutdown for background tasks
//!
//! The owner signals the task, waits up to a stop timeout for it to finish its
//! final drain, then aborts it.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owner side of a background task's shutdown signal
pub struct GracefulShutdownHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
    stop_timeout: Duration,
    name: String,
}

impl GracefulShutdownHandle {
    /// Returns the handle and the receiver to move into the spawned task
    pub fn new(stop_timeout: Duration, name: impl Into<String>) -> (Self, ShutdownReceiver) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                shutdown_tx,
                handle: None,
                stop_timeout,
                name: name.into(),
            },
            ShutdownReceiver { rx: shutdown_rx },
        )
    }

    pub fn set_task(&mut self, handle: JoinHandle<()>) {
        self.handle = Some(handle);
    }

    pub fn has_task(&self) -> bool {
        self.handle.is_some()
    }

    /// Signal shutdown and wait for the task, aborting it once the stop
    /// timeout elapses. Returns true when the task finished on its own.
    pub async fn shutdown(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            debug!(name = %self.name, "No task to shut down");
            return true;
        };

        if self.shutdown_tx.send(true).is_err() {
            // Receiver gone: the task already exited or never listened
            handle.abort();
            return handle.is_finished();
        }

        info!(name = %self.name, "Shutdown signal sent, waiting for drain");

        let abort = handle.abort_handle();
        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(Ok(())) => {
                debug!(name = %self.name, "Task drained gracefully");
                true
            }
            Ok(Err(e)) => {
                if e.is_panic() {
                    warn!(name = %self.name, error = %e, "Task panicked during drain");
                }
                false
            }
            Err(_) => {
                warn!(
                    name = %self.name,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Stop timeout reached, aborting task"
                );
                abort.abort();
                false
            }
        }
    }

    /// Abort the task without waiting for a drain
    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(name = %self.name, "Aborting task immediately");
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Task side of the shutdown signal
#[derive(Clone)]
pub struct ShutdownReceiver {
    rx: watch::Receiver<bool>,
}

impl ShutdownReceiver {
    /// Resolves once shutdown is signaled or the owner is dropped
    pub async fn wait_for_shutdown(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }
}
