//! tracepin Core - Domain entities for dynamic instrumentation
//!
//! This crate contains the domain model shared by every other crate.
//! It has minimal dependencies and no infrastructure concerns.
//!
//! # Architecture
//!
//! - `entities` - Probes, runtime values, captured values, contexts, payloads
//! - `condition` - Probe condition expressions and their evaluation
//! - `template` - Log message templates rendered per firing
//! - `error` - Domain error types
//!
//! # Related Crates
//!
//! - Config types: `tracepin-config` crate
//! - Port traits (InstrumentationTarget, NotifierTransport, sinks): `tracepin-ports`

pub mod condition;
pub mod entities;
pub mod error;
pub mod template;

pub use condition::{Condition, EvaluationError, EvaluationScope, Expr, VariableScope};
pub use entities::{
    path_matches_suffix, CaptureBounds, CaptureFrame, CaptureOverrides, CapturedMap,
    CapturedValue, Captures, Completion, Diagnostics, EvaluationErrorInfo, ExceptionCapture,
    ExecutionContext, HostException, LoggerInfo, NotCapturedReason, ObjectValue, Probe,
    ProbeBuilder, ProbeLocation, ProbeStatus, ProbeType, Reflect, ReflectError, Snapshot,
    SnapshotDebugger, SnapshotLocation, SnapshotPayload, SnapshotProbe, StackFrame,
    StatusDebugger, StatusPayload, ThreadInfo, ThrowableCapture, Value, DD_SOURCE,
    LOGGER_VERSION, SNAPSHOT_LANGUAGE, UNNAMED_TYPE,
};
pub use error::{Error, ErrorCategory, ErrorCode, Result};
pub use template::{MessageTemplate, RenderedMessage, TemplateSegment, EVALUATION_ERROR_TEXT};
