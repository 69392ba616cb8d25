//! Probe event sinks
//!
//! Hooks report what happened through `ProbeEventSink`; the probe manager
//! reports lifecycle transitions through `ProbeStatusSink`. Both are
//! implemented by the notification dispatcher, which turns each call into a
//! payload queued on the notifier worker.
//!
//! Sink methods are called on the host's call path and must not block.

use std::time::Duration;
use tracepin_core::{Error, EvaluationError, ExecutionContext, Probe};

pub trait ProbeEventSink: Send + Sync {
    /// A probe fired and its body ran
    fn probe_executed(&self, context: ExecutionContext);

    /// The probe condition could not be evaluated; the probe body was skipped
    fn condition_evaluation_failed(&self, context: ExecutionContext, error: &EvaluationError);

    /// The circuit breaker disabled the probe after `overhead` of processing
    fn probe_disabled(&self, probe: &Probe, overhead: Duration);
}

pub trait ProbeStatusSink: Send + Sync {
    fn probe_received(&self, probe: &Probe);

    fn probe_installed(&self, probe: &Probe);

    fn probe_errored(&self, probe: &Probe, error: &Error);
}
