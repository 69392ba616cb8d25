//! Recording probe sinks

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracepin_core::{Error, EvaluationError, ExecutionContext, Probe, ProbeStatus};
use tracepin_ports::{ProbeEventSink, ProbeStatusSink};

/// A condition evaluation failure as seen by the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConditionFailure {
    pub probe_id: String,
    pub message: String,
}

/// A lifecycle status as seen by the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatus {
    pub probe_id: String,
    pub status: ProbeStatus,
    /// Error message for `ProbeStatus::Error`
    pub error: Option<String>,
}

/// Sink that records every event and status it receives
#[derive(Default)]
pub struct RecordingSink {
    executions: Mutex<Vec<ExecutionContext>>,
    condition_failures: Mutex<Vec<RecordedConditionFailure>>,
    disabled: Mutex<Vec<(String, Duration)>>,
    statuses: Mutex<Vec<RecordedStatus>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executions(&self) -> Vec<ExecutionContext> {
        lock(&self.executions).clone()
    }

    pub fn execution_count(&self) -> usize {
        lock(&self.executions).len()
    }

    pub fn condition_failures(&self) -> Vec<RecordedConditionFailure> {
        lock(&self.condition_failures).clone()
    }

    pub fn disabled(&self) -> Vec<(String, Duration)> {
        lock(&self.disabled).clone()
    }

    pub fn statuses(&self) -> Vec<RecordedStatus> {
        lock(&self.statuses).clone()
    }

    /// Statuses recorded for one probe, in order
    pub fn statuses_for(&self, probe_id: &str) -> Vec<ProbeStatus> {
        lock(&self.statuses)
            .iter()
            .filter(|s| s.probe_id == probe_id)
            .map(|s| s.status)
            .collect()
    }

    fn push_status(&self, probe: &Probe, status: ProbeStatus, error: Option<String>) {
        lock(&self.statuses).push(RecordedStatus {
            probe_id: probe.id().to_string(),
            status,
            error,
        });
    }
}

impl ProbeEventSink for RecordingSink {
    fn probe_executed(&self, context: ExecutionContext) {
        lock(&self.executions).push(context);
    }

    fn condition_evaluation_failed(&self, context: ExecutionContext, error: &EvaluationError) {
        lock(&self.condition_failures).push(RecordedConditionFailure {
            probe_id: context.probe.id().to_string(),
            message: error.to_string(),
        });
    }

    fn probe_disabled(&self, probe: &Probe, overhead: Duration) {
        lock(&self.disabled).push((probe.id().to_string(), overhead));
    }
}

impl ProbeStatusSink for RecordingSink {
    fn probe_received(&self, probe: &Probe) {
        self.push_status(probe, ProbeStatus::Received, None);
    }

    fn probe_installed(&self, probe: &Probe) {
        self.push_status(probe, ProbeStatus::Installed, None);
    }

    fn probe_errored(&self, probe: &Probe, error: &Error) {
        self.push_status(probe, ProbeStatus::Error, Some(error.to_string()));
    }
}
