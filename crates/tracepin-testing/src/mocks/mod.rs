//! Mock implementations for testing
//!
//! These mocks implement the port traits from `tracepin-ports` and can be used
//! in unit and integration tests.
//!
//! - [`FakeRuntime`] - In-memory host runtime (types, files, hook installation)
//! - [`MockTransport`] - Records sent payloads, injectable failures and delays
//! - [`RecordingSink`] - Records probe events and lifecycle statuses

mod runtime;
mod sinks;
mod transport;

pub use runtime::{FakeRuntime, UNTARGETED_LABEL};
pub use sinks::{RecordedConditionFailure, RecordedStatus, RecordingSink};
pub use transport::MockTransport;
