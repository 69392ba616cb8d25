//! Core domain entities for tracepin
//!
//! # Modules
//!
//! - `probe` - Probe definition and lifecycle flag
//! - `location` - Method/line locations, stack frames, path suffix matching
//! - `value` - Mirror of host runtime values handed to the core
//! - `captured` - Bounded serialized form of observed values
//! - `capture` - Capture bounds and per-probe overrides
//! - `context` - Execution context produced per probe firing
//! - `notification` - Outbound status and snapshot payloads

mod capture;
mod captured;
mod context;
mod location;
mod notification;
mod probe;
mod value;

pub use capture::{CaptureBounds, CaptureOverrides};
pub use captured::{CapturedMap, CapturedValue, NotCapturedReason};
pub use context::{Completion, ExceptionCapture, ExecutionContext, ThreadInfo};
pub use location::{path_matches_suffix, ProbeLocation, StackFrame};
pub use notification::{
    CaptureFrame, Captures, Diagnostics, EvaluationErrorInfo, LoggerInfo, ProbeStatus, Snapshot,
    SnapshotDebugger, SnapshotLocation, SnapshotPayload, SnapshotProbe, StatusDebugger,
    StatusPayload, ThrowableCapture, DD_SOURCE, LOGGER_VERSION, SNAPSHOT_LANGUAGE,
};
pub use probe::{
    Probe, ProbeBuilder, ProbeType, PROBE_TYPE_LOG, PROBE_TYPE_METRIC, PROBE_TYPE_SPAN,
};
pub use value::{
    HostException, ObjectValue, Reflect, ReflectError, Value, BUILTIN_TYPE_NAMES, TYPE_ARRAY,
    TYPE_BOOL, TYPE_FLOAT, TYPE_HASH, TYPE_INTEGER, TYPE_NIL, TYPE_STRING, TYPE_SYMBOL, TYPE_TIME,
    UNNAMED_TYPE,
};
