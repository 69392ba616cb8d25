//! Outbound notification payloads
//!
//! Two payload families leave the process:
//!
//! - `StatusPayload` - probe lifecycle diagnostics (received, installed,
//!   emitting, error)
//! - `SnapshotPayload` - one probe firing, optionally with captured state
//!
//! Both serialize to the JSON shape the debugger backend intake expects.

use crate::entities::captured::CapturedMap;
use crate::entities::location::StackFrame;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// `ddsource` tag carried by every payload
pub const DD_SOURCE: &str = "dd_debugger";

/// Language tag carried by snapshots
pub const SNAPSHOT_LANGUAGE: &str = "rust";

/// Logger metadata version understood by the intake
pub const LOGGER_VERSION: u32 = 2;

/// Probe lifecycle status reported to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    Received,
    Installed,
    Emitting,
    Error,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Received => "RECEIVED",
            ProbeStatus::Installed => "INSTALLED",
            ProbeStatus::Emitting => "EMITTING",
            ProbeStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status payload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub service: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub message: String,
    pub ddsource: String,
    pub debugger: StatusDebugger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDebugger {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub probe_id: String,
    pub probe_version: u64,
    pub runtime_id: String,
    pub parent_id: Option<String>,
    pub status: ProbeStatus,
}

impl StatusPayload {
    pub fn probe_id(&self) -> &str {
        &self.debugger.diagnostics.probe_id
    }

    pub fn status(&self) -> ProbeStatus {
        self.debugger.diagnostics.status
    }
}

// ============================================================================
// Snapshot payload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotPayload {
    pub service: String,
    pub ddsource: String,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Duration of the instrumented call in nanoseconds
    pub duration: u64,
    pub logger: LoggerInfo,
    pub debugger: SnapshotDebugger,
}

impl SnapshotPayload {
    pub fn probe_id(&self) -> &str {
        &self.debugger.snapshot.probe.id
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.debugger.snapshot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggerInfo {
    pub name: Option<String>,
    pub method: Option<String>,
    pub thread_name: Option<String>,
    pub thread_id: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotDebugger {
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub evaluation_errors: Vec<EvaluationErrorInfo>,
    pub probe: SnapshotProbe,
    pub language: String,
    pub stack: Vec<StackFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captures: Option<Captures>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationErrorInfo {
    pub expr: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotProbe {
    pub id: String,
    pub version: u64,
    pub location: SnapshotLocation,
}

/// Probe location as reported in snapshots.
///
/// Method probes fill `type`/`method`, line probes fill `file`/`lines`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotLocation {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<String>>,
}

/// Captured state of one firing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Captures {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<CaptureFrame>,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_: Option<CaptureFrame>,
    /// Keyed by line number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<BTreeMap<String, CaptureFrame>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaptureFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<CapturedMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locals: Option<CapturedMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throwable: Option<ThrowableCapture>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrowableCapture {
    #[serde(rename = "type")]
    pub type_name: String,
    pub message: String,
    pub stacktrace: Vec<StackFrame>,
}
