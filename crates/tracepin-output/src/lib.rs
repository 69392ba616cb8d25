//! tracepin Output
//!
//! Outbound side of the instrumentation pipeline. Payload construction is
//! pure; the notifier worker is the only component that owns a background
//! task and talks to the `NotifierTransport` port.
//!
//! # Features
//!
//! - **Notification builder**: status and snapshot payloads
//! - **Notifier worker**: bounded queues, interval batching, retry on failure
//! - **Graceful shutdown**: signal, bounded wait, abort

pub mod notification;
pub mod notifier_worker;
pub mod shutdown;

pub use notification::{ProbeNotificationBuilder, RETURN_ARGUMENT, SELF_ARGUMENT};
pub use notifier_worker::{NotifierStats, NotifierWorkerConfig, ProbeNotifierWorker};
pub use shutdown::{GracefulShutdownHandle, ShutdownReceiver};
