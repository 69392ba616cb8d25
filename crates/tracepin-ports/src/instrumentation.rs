//! Instrumentation Target Port
//!
//! Abstracts the host runtime's ability to locate code and attach hooks to it.
//! Each host implements this with its native mechanism (method wrapping,
//! per-line trap points, trampolines); the rest of tracepin is written only
//! against this interface.
//!
//! # Flow
//!
//! ```text
//! HookTarget --resolve--> CodeHandle --install(Hook)--> InstallationToken
//!                                                            |
//!                                                        uninstall
//! ```
//!
//! All calls are synchronous: hooks run inline on the host's call path.

use std::fmt;
use std::sync::Arc;
use tracepin_core::{HostException, Result, StackFrame, Value};

/// Opaque reference to a loaded unit of code or a resolved hook point.
///
/// Handles are minted by the host and never interpreted by tracepin beyond
/// equality and logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeHandle {
    id: u64,
    label: String,
}

impl CodeHandle {
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Proof of an installed hook, required to remove it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstallationToken {
    id: u64,
    code: CodeHandle,
}

impl InstallationToken {
    pub fn new(id: u64, code: CodeHandle) -> Self {
        Self { id, code }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn code(&self) -> &CodeHandle {
        &self.code
    }
}

/// What to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookTarget {
    Method {
        type_name: String,
        method_name: String,
    },
    /// `code == None` requests the untargeted, process-wide line hook;
    /// the installed hook then sees every executed line.
    Line {
        code: Option<CodeHandle>,
        file: String,
        line_no: u32,
    },
}

impl HookTarget {
    pub fn is_untargeted(&self) -> bool {
        matches!(self, HookTarget::Line { code: None, .. })
    }
}

impl fmt::Display for HookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTarget::Method {
                type_name,
                method_name,
            } => write!(f, "{}.{}", type_name, method_name),
            HookTarget::Line {
                code: Some(_),
                file,
                line_no,
            } => write!(f, "{}:{}", file, line_no),
            HookTarget::Line {
                code: None,
                file,
                line_no,
            } => write!(f, "{}:{} (untargeted)", file, line_no),
        }
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Result of the original call, returned unchanged to the host
pub type CallOutcome = std::result::Result<Value, HostException>;

/// One invocation of an instrumented method
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub type_name: String,
    pub method_name: String,
    /// `self`, when the method has one
    pub receiver: Option<Value>,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
    /// Innermost caller first
    pub caller_locations: Vec<StackFrame>,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
}

impl MethodCall {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            receiver: None,
            args: Vec::new(),
            kwargs: Vec::new(),
            caller_locations: Vec::new(),
            source_file: None,
            source_line: None,
        }
    }

    pub fn with_receiver(mut self, receiver: impl Into<Value>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.push((name.into(), value.into()));
        self
    }

    pub fn with_caller(mut self, frame: StackFrame) -> Self {
        self.caller_locations.push(frame);
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, line: u32) -> Self {
        self.source_file = Some(file.into());
        self.source_line = Some(line);
        self
    }
}

/// Wraps every invocation of a method.
///
/// Implementations must call `proceed` exactly once and return its outcome
/// unchanged.
pub trait MethodHook: Send + Sync {
    fn around(&self, call: &MethodCall, proceed: &mut dyn FnMut() -> CallOutcome) -> CallOutcome;
}

/// One executed source line
#[derive(Debug, Clone)]
pub struct LineEvent {
    pub path: String,
    pub line_no: u32,
    pub locals: Vec<(String, Value)>,
    pub receiver: Option<Value>,
    /// Innermost frame first
    pub caller_locations: Vec<StackFrame>,
}

impl LineEvent {
    pub fn new(path: impl Into<String>, line_no: u32) -> Self {
        Self {
            path: path.into(),
            line_no,
            locals: Vec::new(),
            receiver: None,
            caller_locations: Vec::new(),
        }
    }

    pub fn with_local(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.push((name.into(), value.into()));
        self
    }

    pub fn with_receiver(mut self, receiver: impl Into<Value>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }
}

/// Observes executed lines. Must never affect the host's control flow.
pub trait LineHook: Send + Sync {
    fn on_line(&self, event: &LineEvent);
}

#[derive(Clone)]
pub enum Hook {
    Method(Arc<dyn MethodHook>),
    Line(Arc<dyn LineHook>),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Method(_) => f.write_str("Hook::Method"),
            Hook::Line(_) => f.write_str("Hook::Line"),
        }
    }
}

// ============================================================================
// Port
// ============================================================================

/// Port trait for the host runtime's code location and hook installation
pub trait InstrumentationTarget: Send + Sync {
    /// Resolve a hook point.
    ///
    /// Fails with `Error::TargetNotDefined` when a method target's type or
    /// method does not exist yet.
    fn resolve(&self, target: &HookTarget) -> Result<CodeHandle>;

    /// Attach `hook` to a resolved point
    fn install(&self, code: &CodeHandle, hook: Hook) -> Result<InstallationToken>;

    /// Detach a previously installed hook
    fn uninstall(&self, token: &InstallationToken) -> Result<()>;
}
