//! Instrumentation services
//!
//! Everything between the host runtime's events and the notifier queues.
//! Services talk to the host only through `tracepin-ports` traits.

pub mod code_registry;
pub mod dispatch;
pub mod instrumenter;
pub mod probe_manager;
pub mod remote_sync;

pub use code_registry::CodeRegistry;
pub use dispatch::NotificationDispatcher;
pub use instrumenter::{Instrumenter, InstrumenterSettings};
pub use probe_manager::ProbeManager;
pub use remote_sync::{parse_probe_definition, ProbeDefaults, ProbeSnapshotSync, SyncReport};
