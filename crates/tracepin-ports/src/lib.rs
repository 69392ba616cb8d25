//! Port trait definitions for tracepin
//!
//! This crate contains all port (interface) traits following Clean Architecture.
//! Host integrations implement these traits, the application layer uses them.
//! Keeping them apart from the application crate lets the testing crate
//! provide mocks without a dependency cycle.
//!
//! # Port Types
//!
//! - **Instrumentation target**: code resolution and hook installation in the host runtime
//! - **Notifier transport**: outbound delivery of payloads to the backend
//! - **Sinks**: probe execution and lifecycle events

mod instrumentation;
mod sink;
mod transport;

pub use instrumentation::{
    CallOutcome, CodeHandle, Hook, HookTarget, InstallationToken, InstrumentationTarget,
    LineEvent, LineHook, MethodCall, MethodHook,
};
pub use sink::{ProbeEventSink, ProbeStatusSink};
pub use transport::{NotifierTransport, NullTransport};

// Type aliases for convenience
use std::sync::Arc;

/// Thread-safe reference to an instrumentation target
pub type InstrumentationTargetRef = Arc<dyn InstrumentationTarget + Send + Sync>;

/// Thread-safe reference to a notifier transport
pub type NotifierTransportRef = Arc<dyn NotifierTransport + Send + Sync>;

/// Thread-safe reference to a probe event sink
pub type ProbeEventSinkRef = Arc<dyn ProbeEventSink + Send + Sync>;

/// Thread-safe reference to a probe status sink
pub type ProbeStatusSinkRef = Arc<dyn ProbeStatusSink + Send + Sync>;
