//! Error types for the tracepin core domain

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Error Codes - Machine-readable codes for telemetry consumers
// ============================================================================

/// Machine-readable error codes.
///
/// Error code ranges:
/// - 1xxx: Probe definition errors
/// - 2xxx: Instrumentation errors
/// - 3xxx: Config errors
/// - 4xxx: Communication errors
/// - 5xxx: Infrastructure errors
/// - 9xxx: Generic errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u16")]
pub enum ErrorCode {
    // Probe errors (1xxx)
    /// Invalid probe definition (1001)
    ProbeInvalid = 1001,
    /// Unknown probe type (1002)
    ProbeUnknownType = 1002,
    /// Line number requested from a method probe (1003)
    ProbeMissingLineNumber = 1003,
    /// Invalid condition expression (1004)
    ProbeInvalidCondition = 1004,
    /// Probe is already instrumented (1005)
    ProbeAlreadyInstrumented = 1005,
    /// Probe failed to install earlier (1006)
    ProbePreviouslyFailed = 1006,

    // Instrumentation errors (2xxx)
    /// Target type, method or file is not (yet) defined (2001)
    TargetNotDefined = 2001,
    /// Line probe on a file the code registry does not track (2002)
    TargetNotInRegistry = 2002,
    /// Path suffix matches more than one registered file (2003)
    MultiplePathsMatch = 2003,
    /// Hook installation or removal failed (2004)
    InstrumentationFailed = 2004,
    /// Probe manager has been closed (2005)
    ProbeManagerClosed = 2005,

    // Config errors (3xxx)
    /// Invalid configuration (3001)
    ConfigInvalid = 3001,

    // Communication errors (4xxx)
    /// Agent or backend unreachable, or timed out (4001)
    AgentCommunication = 4001,

    // Infrastructure errors (5xxx)
    /// I/O error (5001)
    IoError = 5001,
    /// Serialization error (5002)
    SerializationError = 5002,
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

// ============================================================================
// Error Categories - Classification for retry logic
// ============================================================================

/// Error categorization for retry handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Temporary failure, retried later (target not loaded yet, agent down)
    Retryable,
    /// Permanent failure, don't retry (invalid probe, ambiguous path)
    Terminal,
    /// Unexpected failure inside the instrumentation layer
    Internal,
}

impl ErrorCategory {
    /// Get the category name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::Retryable => "retryable",
            ErrorCategory::Terminal => "terminal",
            ErrorCategory::Internal => "internal",
        }
    }

    /// Returns true if this error category indicates the operation can be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Retryable)
    }
}

impl ErrorCode {
    /// Get the numeric value of the error code
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the category of this error code
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::TargetNotDefined => ErrorCategory::Retryable,
            ErrorCode::AgentCommunication => ErrorCategory::Retryable,
            ErrorCode::IoError => ErrorCategory::Retryable,

            ErrorCode::ProbeInvalid => ErrorCategory::Terminal,
            ErrorCode::ProbeUnknownType => ErrorCategory::Terminal,
            ErrorCode::ProbeMissingLineNumber => ErrorCategory::Terminal,
            ErrorCode::ProbeInvalidCondition => ErrorCategory::Terminal,
            ErrorCode::ProbeAlreadyInstrumented => ErrorCategory::Terminal,
            ErrorCode::ProbePreviouslyFailed => ErrorCategory::Terminal,
            ErrorCode::TargetNotInRegistry => ErrorCategory::Terminal,
            ErrorCode::MultiplePathsMatch => ErrorCategory::Terminal,
            ErrorCode::ProbeManagerClosed => ErrorCategory::Terminal,
            ErrorCode::ConfigInvalid => ErrorCategory::Terminal,

            ErrorCode::InstrumentationFailed => ErrorCategory::Internal,
            ErrorCode::SerializationError => ErrorCategory::Internal,
        }
    }

    /// Get the error code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::ProbeInvalid => "PROBE_INVALID",
            ErrorCode::ProbeUnknownType => "PROBE_UNKNOWN_TYPE",
            ErrorCode::ProbeMissingLineNumber => "PROBE_MISSING_LINE_NUMBER",
            ErrorCode::ProbeInvalidCondition => "PROBE_INVALID_CONDITION",
            ErrorCode::ProbeAlreadyInstrumented => "PROBE_ALREADY_INSTRUMENTED",
            ErrorCode::ProbePreviouslyFailed => "PROBE_PREVIOUSLY_FAILED",

            ErrorCode::TargetNotDefined => "TARGET_NOT_DEFINED",
            ErrorCode::TargetNotInRegistry => "TARGET_NOT_IN_REGISTRY",
            ErrorCode::MultiplePathsMatch => "MULTIPLE_PATHS_MATCH",
            ErrorCode::InstrumentationFailed => "INSTRUMENTATION_FAILED",
            ErrorCode::ProbeManagerClosed => "PROBE_MANAGER_CLOSED",

            ErrorCode::ConfigInvalid => "CONFIG_INVALID",

            ErrorCode::AgentCommunication => "AGENT_COMMUNICATION",

            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Probe errors
    #[error("Invalid probe: {0}")]
    InvalidProbe(String),

    #[error("Unknown probe type: {0}")]
    UnknownProbeType(String),

    #[error("Probe {0} does not have a line number (method probe)")]
    MissingLineNumber(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Probe {0} is already instrumented")]
    AlreadyInstrumented(String),

    #[error("Probe {id} failed to install previously: {message}")]
    ProbePreviouslyFailed { id: String, message: String },

    // Instrumentation errors
    /// The location cannot be resolved yet. Recoverable: the probe waits
    /// in the pending set until the code is loaded.
    #[error("Target not defined: {0}")]
    TargetNotDefined(String),

    #[error("File not in code registry: {0}")]
    TargetNotInRegistry(String),

    #[error("Multiple paths match suffix {suffix}: {}", paths.join(", "))]
    MultiplePathsMatch { suffix: String, paths: Vec<String> },

    #[error("Instrumentation failed: {0}")]
    Instrumentation(String),

    #[error("Probe manager is closed")]
    ProbeManagerClosed,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Transport errors (agent unreachable, timeouts)
    #[error("Agent communication error: {0}")]
    AgentCommunication(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Get the machine-readable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidProbe(_) => ErrorCode::ProbeInvalid,
            Error::UnknownProbeType(_) => ErrorCode::ProbeUnknownType,
            Error::MissingLineNumber(_) => ErrorCode::ProbeMissingLineNumber,
            Error::InvalidCondition(_) => ErrorCode::ProbeInvalidCondition,
            Error::AlreadyInstrumented(_) => ErrorCode::ProbeAlreadyInstrumented,
            Error::ProbePreviouslyFailed { .. } => ErrorCode::ProbePreviouslyFailed,

            Error::TargetNotDefined(_) => ErrorCode::TargetNotDefined,
            Error::TargetNotInRegistry(_) => ErrorCode::TargetNotInRegistry,
            Error::MultiplePathsMatch { .. } => ErrorCode::MultiplePathsMatch,
            Error::Instrumentation(_) => ErrorCode::InstrumentationFailed,
            Error::ProbeManagerClosed => ErrorCode::ProbeManagerClosed,

            Error::InvalidConfig(_) => ErrorCode::ConfigInvalid,

            Error::AgentCommunication(_) => ErrorCode::AgentCommunication,

            Error::Io(_) => ErrorCode::IoError,
            Error::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the error code name (e.g., "TARGET_NOT_DEFINED")
    pub fn code_name(&self) -> &'static str {
        self.code().name()
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Returns true if this error is safe to retry.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// True for the "not yet resolvable" case that parks a probe as pending.
    pub fn is_target_not_defined(&self) -> bool {
        matches!(self, Error::TargetNotDefined(_))
    }

    /// Helper to create an agent communication error
    pub fn agent_communication(message: impl Into<String>) -> Self {
        Error::AgentCommunication(message.into())
    }

    /// Helper to create a generic instrumentation error
    pub fn instrumentation(message: impl Into<String>) -> Self {
        Error::Instrumentation(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
