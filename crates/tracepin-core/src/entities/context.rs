//! Execution context produced each time a probe fires

use crate::entities::captured::{CapturedMap, CapturedValue};
use crate::entities::location::StackFrame;
use crate::entities::notification::EvaluationErrorInfo;
use crate::entities::probe::Probe;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serialized exception raised by the instrumented call
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionCapture {
    pub type_name: String,
    pub message: String,
    pub fields: Option<CapturedValue>,
}

/// How an instrumented method call ended. The two outcomes are exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Normal return. `value` is present only when snapshots are captured.
    Returned { value: Option<CapturedValue> },
    Raised { exception: ExceptionCapture },
}

static NEXT_THREAD_NUMBER: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_NUMBER: u64 = NEXT_THREAD_NUMBER.fetch_add(1, Ordering::Relaxed);
}

/// Thread that executed the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub name: Option<String>,
    pub id: String,
}

impl ThreadInfo {
    /// Describe the calling thread.
    ///
    /// `id` is a process-wide number assigned on first use, stable for
    /// the life of the thread.
    pub fn current() -> Self {
        Self {
            name: std::thread::current().name().map(str::to_string),
            id: THREAD_NUMBER.with(|n| n.to_string()),
        }
    }
}

/// Everything observed during one probe firing.
///
/// Built by the instrumenter at the moment a hook fires and handed to the
/// notification pipeline. It is never persisted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub probe: Arc<Probe>,
    /// Duration of the instrumented call (zero for line probes)
    pub duration: Duration,
    /// Method probes only
    pub completion: Option<Completion>,
    pub serialized_entry_args: Option<CapturedMap>,
    pub serialized_receiver: Option<CapturedValue>,
    /// Line probes only
    pub locals: Option<CapturedMap>,
    pub caller_locations: Vec<StackFrame>,
    pub path: Option<String>,
    pub line_no: Option<u32>,
    pub thread: ThreadInfo,
    pub fired_at: DateTime<Utc>,
    /// Rendered log message, when the probe has a template
    pub message: Option<String>,
    /// Template segments that failed to evaluate
    pub evaluation_errors: Vec<EvaluationErrorInfo>,
}

impl ExecutionContext {
    /// Empty context for `probe`, stamped now on the current thread
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            probe,
            duration: Duration::ZERO,
            completion: None,
            serialized_entry_args: None,
            serialized_receiver: None,
            locals: None,
            caller_locations: Vec::new(),
            path: None,
            line_no: None,
            thread: ThreadInfo::current(),
            fired_at: Utc::now(),
            message: None,
            evaluation_errors: Vec::new(),
        }
    }

    pub fn return_value(&self) -> Option<&CapturedValue> {
        match &self.completion {
            Some(Completion::Returned { value }) => value.as_ref(),
            _ => None,
        }
    }

    pub fn exception(&self) -> Option<&ExceptionCapture> {
        match &self.completion {
            Some(Completion::Raised { exception }) => Some(exception),
            _ => None,
        }
    }

    /// True when any value was serialized into this context
    pub fn has_captures(&self) -> bool {
        self.serialized_entry_args.is_some()
            || self.locals.is_some()
            || self.return_value().is_some()
            || self.serialized_receiver.is_some()
    }
}
