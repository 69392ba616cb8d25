//! Test utilities for tracepin
//!
//! This crate provides mocks, fixtures, and helpers for testing tracepin components.
//!
//! # Mocks
//!
//! - [`FakeRuntime`] - In-memory host implementing `InstrumentationTarget`
//! - [`MockTransport`] - Notifier transport recording statuses and batches
//! - [`RecordingSink`] - Probe event/status sink recording every call
//!
//! # Fixtures
//!
//! - [`fixtures::method_probe`] / [`fixtures::line_probe`] - Sample probes
//! - [`fixtures::fast_config`] - Config tuned for fast, deterministic tests
//!
//! # Property tests
//!
//! - [`proptest_config`] - Case counts and nested `Value` generators
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracepin_testing::{fixtures, FakeRuntime, MockTransport};
//!
//! let runtime = FakeRuntime::shared();
//! runtime.define_type("Billing", &["charge"]);
//! let probe = fixtures::method_probe("p1", "Billing", "charge");
//! ```

pub mod fixtures;
mod mocks;
pub mod proptest_config;

pub use mocks::{
    FakeRuntime, MockTransport, RecordedConditionFailure, RecordedStatus, RecordingSink,
    UNTARGETED_LABEL,
};
