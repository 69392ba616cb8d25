//! In-memory host runtime implementing `InstrumentationTarget`
//!
//! `FakeRuntime` models just enough of a host for tracepin to hook into:
//! types with methods, loaded source files with executable lines, and
//! explicit "execution" calls standing in for the host running code.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracepin_core::{Error, Result};
use tracepin_ports::{
    CallOutcome, CodeHandle, Hook, HookTarget, InstallationToken, InstrumentationTarget,
    LineEvent, LineHook, MethodCall, MethodHook,
};

/// Label of the handle returned for untargeted line hooks
pub const UNTARGETED_LABEL: &str = "<all lines>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum HookPoint {
    Method {
        type_name: String,
        method_name: String,
    },
    Line {
        path: String,
        line_no: u32,
    },
    AllLines,
}

struct SourceFile {
    handle: CodeHandle,
    executable_lines: BTreeSet<u32>,
}

struct InstalledHook {
    point: HookPoint,
    label: String,
    hook: Hook,
}

#[derive(Default)]
struct RuntimeState {
    next_id: u64,
    types: HashMap<String, HashSet<String>>,
    files: HashMap<String, SourceFile>,
    points: HashMap<u64, HookPoint>,
    installed: HashMap<u64, InstalledHook>,
    install_failure: Option<String>,
    uninstall_failures: HashSet<String>,
}

impl RuntimeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A fake host runtime.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = FakeRuntime::new();
/// runtime.define_type("Billing", &["charge"]);
/// // ... install a probe through the instrumenter ...
/// let outcome = runtime.call_method(MethodCall::new("Billing", "charge"), || Ok(Value::Nil));
/// ```
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
    install_count: AtomicUsize,
    uninstall_count: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Host setup
    // ------------------------------------------------------------------

    /// Define (or extend) a type with the given methods
    pub fn define_type(&self, type_name: &str, methods: &[&str]) {
        let mut state = self.lock();
        let entry = state.types.entry(type_name.to_string()).or_default();
        entry.extend(methods.iter().map(|m| m.to_string()));
    }

    /// Load a source file whose listed lines are executable.
    ///
    /// Returns the handle the host would pass to the code registry.
    pub fn define_file(&self, path: &str, executable_lines: &[u32]) -> CodeHandle {
        let mut state = self.lock();
        let id = state.next_id();
        let handle = CodeHandle::new(id, path);
        state.files.insert(
            path.to_string(),
            SourceFile {
                handle: handle.clone(),
                executable_lines: executable_lines.iter().copied().collect(),
            },
        );
        handle
    }

    /// Make every subsequent `install` fail with an instrumentation error
    pub fn fail_installs(&self, message: &str) {
        self.lock().install_failure = Some(message.to_string());
    }

    pub fn clear_install_failure(&self) {
        self.lock().install_failure = None;
    }

    /// Make `uninstall` fail for hooks installed at `label`
    /// (`Type.method` or `file:line`)
    pub fn fail_uninstall_for(&self, label: &str) {
        self.lock().uninstall_failures.insert(label.to_string());
    }

    pub fn clear_uninstall_failures(&self) {
        self.lock().uninstall_failures.clear();
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Invoke a method, running every installed hook around `body`.
    ///
    /// Hooks are called outside the runtime lock so re-entrant calls work.
    pub fn call_method<F>(&self, call: MethodCall, mut body: F) -> CallOutcome
    where
        F: FnMut() -> CallOutcome,
    {
        let hooks: Vec<Arc<dyn MethodHook>> = {
            let state = self.lock();
            let mut ids: Vec<&u64> = state.installed.keys().collect();
            ids.sort();
            ids.into_iter()
                .filter_map(|id| state.installed.get(id))
                .filter_map(|installed| match (&installed.point, &installed.hook) {
                    (
                        HookPoint::Method {
                            type_name,
                            method_name,
                        },
                        Hook::Method(hook),
                    ) if *type_name == call.type_name && *method_name == call.method_name => {
                        Some(Arc::clone(hook))
                    }
                    _ => None,
                })
                .collect()
        };
        run_hooks(&hooks, &call, &mut body)
    }

    /// Execute one source line.
    ///
    /// Lines of a loaded file that are not executable never fire any hook.
    /// Untargeted hooks see every executed line, loaded or not.
    pub fn execute_line(&self, event: LineEvent) {
        let hooks: Vec<Arc<dyn LineHook>> = {
            let state = self.lock();
            if let Some(file) = state.files.get(&event.path) {
                if !file.executable_lines.contains(&event.line_no) {
                    return;
                }
            }
            state
                .installed
                .values()
                .filter_map(|installed| match (&installed.point, &installed.hook) {
                    (HookPoint::Line { path, line_no }, Hook::Line(hook))
                        if *path == event.path && *line_no == event.line_no =>
                    {
                        Some(Arc::clone(hook))
                    }
                    (HookPoint::AllLines, Hook::Line(hook)) => Some(Arc::clone(hook)),
                    _ => None,
                })
                .collect()
        };
        for hook in hooks {
            hook.on_line(&event);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn install_count(&self) -> usize {
        self.install_count.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.uninstall_count.load(Ordering::SeqCst)
    }

    /// Number of hooks currently installed
    pub fn installed_hooks(&self) -> usize {
        self.lock().installed.len()
    }

    /// Labels of installed hooks, sorted
    pub fn installed_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .lock()
            .installed
            .values()
            .map(|h| h.label.clone())
            .collect();
        labels.sort();
        labels
    }
}

fn run_hooks(
    hooks: &[Arc<dyn MethodHook>],
    call: &MethodCall,
    body: &mut dyn FnMut() -> CallOutcome,
) -> CallOutcome {
    match hooks.split_first() {
        None => body(),
        Some((first, rest)) => first.around(call, &mut || run_hooks(rest, call, &mut *body)),
    }
}

impl InstrumentationTarget for FakeRuntime {
    fn resolve(&self, target: &HookTarget) -> Result<CodeHandle> {
        let mut state = self.lock();
        let (point, label) = match target {
            HookTarget::Method {
                type_name,
                method_name,
            } => {
                let defined = state
                    .types
                    .get(type_name)
                    .map(|methods| methods.contains(method_name))
                    .unwrap_or(false);
                if !defined {
                    return Err(Error::TargetNotDefined(format!(
                        "{}.{}",
                        type_name, method_name
                    )));
                }
                (
                    HookPoint::Method {
                        type_name: type_name.clone(),
                        method_name: method_name.clone(),
                    },
                    format!("{}.{}", type_name, method_name),
                )
            }
            HookTarget::Line {
                code: Some(code),
                line_no,
                ..
            } => {
                let path = state
                    .files
                    .iter()
                    .find(|(_, file)| file.handle == *code)
                    .map(|(path, _)| path.clone())
                    .ok_or_else(|| {
                        Error::TargetNotDefined(format!("unknown code unit {}", code.label()))
                    })?;
                let label = format!("{}:{}", path, line_no);
                (
                    HookPoint::Line {
                        path,
                        line_no: *line_no,
                    },
                    label,
                )
            }
            HookTarget::Line { code: None, .. } => {
                (HookPoint::AllLines, UNTARGETED_LABEL.to_string())
            }
        };

        let id = state.next_id();
        state.points.insert(id, point);
        Ok(CodeHandle::new(id, label))
    }

    fn install(&self, code: &CodeHandle, hook: Hook) -> Result<InstallationToken> {
        let mut state = self.lock();
        if let Some(message) = &state.install_failure {
            return Err(Error::instrumentation(message.clone()));
        }
        let point = state
            .points
            .get(&code.id())
            .cloned()
            .ok_or_else(|| Error::instrumentation(format!("unresolved handle {}", code.label())))?;

        let id = state.next_id();
        state.installed.insert(
            id,
            InstalledHook {
                point,
                label: code.label().to_string(),
                hook,
            },
        );
        self.install_count.fetch_add(1, Ordering::SeqCst);
        Ok(InstallationToken::new(id, code.clone()))
    }

    fn uninstall(&self, token: &InstallationToken) -> Result<()> {
        let mut state = self.lock();
        if state.uninstall_failures.contains(token.code().label()) {
            return Err(Error::instrumentation(format!(
                "cannot remove hook at {}",
                token.code().label()
            )));
        }
        if state.installed.remove(&token.id()).is_some() {
            self.uninstall_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
