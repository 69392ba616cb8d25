//! # tracepin Application Layer
//!
//! Probe lifecycle and hot-path logic of dynamic instrumentation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Host integration                   │  <- implements tracepin-ports
//! │  (runtime hooks, transport)         │
//! ├─────────────────────────────────────┤
//! │  Application Layer                  │  <- THIS CRATE
//! │  (instrumenter, manager, capture)   │
//! ├─────────────────────────────────────┤
//! │  Output                             │  <- tracepin-output
//! │  (payloads, notifier worker)        │
//! ├─────────────────────────────────────┤
//! │  Domain Layer                       │  <- tracepin-core
//! │  (probes, values, conditions)       │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! - [`DynamicInstrumentation`] - owns and wires every component below
//! - [`Instrumenter`] - installs method and line hooks through the target port
//! - [`ProbeManager`] - pending/installed/failed probe sets
//! - [`ProbeSnapshotSync`] - reconciles remote probe snapshots
//! - [`Serializer`] / [`Redactor`] - bounded, redacted value capture
//! - [`ProbeCircuitBreaker`] / [`RateLimiter`] - overhead and volume safety

pub mod capture;
pub mod context;
pub mod error;
pub mod safety;
pub mod services;

// Output ports are in tracepin-ports crate
// Re-export for convenience
pub use tracepin_ports as ports;

pub use capture::{CustomSerializerFn, CustomSerializers, Redactor, Serializer, ValuePredicate};
pub use context::DynamicInstrumentation;
pub use error::{Error, Result};
pub use safety::{CircuitBreakerStats, ProbeCircuitBreaker, RateLimiter};
pub use services::{
    parse_probe_definition, CodeRegistry, Instrumenter, InstrumenterSettings,
    NotificationDispatcher, ProbeDefaults, ProbeManager, ProbeSnapshotSync, SyncReport,
};
