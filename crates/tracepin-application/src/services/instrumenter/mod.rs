//! Instrumenter - installs probe hooks into the host runtime
//!
//! Resolves each probe's location through the `InstrumentationTarget` port
//! and installs a hook that runs the probe body on every firing:
//!
//! ```text
//! firing ─► enabled? ─► condition ─► rate limit ─► capture ─► sink
//!              │            │             │
//!              └────────────┴─────────────┴──► original code only
//! ```
//!
//! Everything except the original call counts as processing overhead and
//! feeds the probe's circuit breaker. Hooks run inline on the host thread;
//! the only thing they hand off is an `ExecutionContext` for the sink.

mod line;
mod method;

use crate::capture::{Capture, Serializer};
use crate::safety::{CircuitBreakerStats, ProbeCircuitBreaker, RateLimiter};
use crate::services::code_registry::CodeRegistry;
use line::LineProbeHook;
use method::MethodProbeHook;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracepin_config::InstrumentationConfig;
use tracepin_core::{
    CaptureBounds, Error, EvaluationError, EvaluationScope, ExecutionContext, Probe, Result,
    Value,
};
use tracepin_ports::{
    Hook, HookTarget, InstallationToken, InstrumentationTargetRef, ProbeEventSinkRef,
};
use tracing::{debug, error, info, warn};

/// Instrumenter behaviour knobs, read once from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumenterSettings {
    /// Allow the process-wide line hook when a file is not in the registry
    pub untargeted_trace_points: bool,
    pub max_processing_time: Duration,
    pub snapshot_rate_limit: f64,
    pub log_rate_limit: f64,
    pub condition_failure_rate_limit: f64,
}

impl InstrumenterSettings {
    pub fn from_config(config: &InstrumentationConfig) -> Self {
        Self {
            untargeted_trace_points: config.untargeted_trace_points,
            max_processing_time: config.max_processing_time(),
            snapshot_rate_limit: config.snapshot_rate_limit,
            log_rate_limit: config.log_rate_limit,
            condition_failure_rate_limit: config.condition_failure_rate_limit,
        }
    }

    /// Sampling rate for `probe`: its own limit, else the default for its kind
    pub fn rate_limit_for(&self, probe: &Probe) -> f64 {
        probe.rate_limit().unwrap_or(if probe.capture_snapshot() {
            self.snapshot_rate_limit
        } else {
            self.log_rate_limit
        })
    }
}

impl Default for InstrumenterSettings {
    fn default() -> Self {
        Self::from_config(&InstrumentationConfig::default())
    }
}

// ============================================================================
// Per-probe firing state
// ============================================================================

/// State shared by an installed hook and the instrumenter
pub(crate) struct HookState {
    probe: Arc<Probe>,
    sink: ProbeEventSinkRef,
    serializer: Arc<Serializer>,
    bounds: CaptureBounds,
    breaker: ProbeCircuitBreaker,
    sampler: RateLimiter,
    condition_failure_sampler: RateLimiter,
}

impl HookState {
    fn new(
        probe: Arc<Probe>,
        sink: ProbeEventSinkRef,
        serializer: Arc<Serializer>,
        settings: &InstrumenterSettings,
    ) -> Self {
        let bounds = probe.capture_overrides().apply_to(serializer.bounds());
        Self {
            breaker: ProbeCircuitBreaker::new(probe.id(), settings.max_processing_time),
            sampler: RateLimiter::new(settings.rate_limit_for(&probe)),
            condition_failure_sampler: RateLimiter::new(settings.condition_failure_rate_limit),
            probe,
            sink,
            serializer,
            bounds,
        }
    }

    pub(crate) fn probe(&self) -> &Arc<Probe> {
        &self.probe
    }

    pub(crate) fn capture(&self) -> Capture<'_> {
        self.serializer.capture(self.bounds)
    }

    pub(crate) fn sample(&self) -> bool {
        self.sampler.try_acquire()
    }

    pub(crate) fn emit_executed(&self, context: ExecutionContext) {
        self.sink.probe_executed(context);
    }

    /// Report a failed condition, subject to its own sampler
    /// Render the probe's message template into `context`
    pub(crate) fn render_message(
        &self,
        context: &mut ExecutionContext,
        scope: &dyn EvaluationScope,
    ) {
        let Some(template) = self.probe.template() else {
            return;
        };
        let capture = self.capture();
        let rendered = template.render(scope, &|name, value| capture.message_text(name, value));
        context.message = Some(rendered.text);
        context.evaluation_errors = rendered.errors;
    }

    pub(crate) fn emit_condition_failure(&self, context: ExecutionContext, error: &EvaluationError) {
        debug!(probe_id = %self.probe.id(), error = %error, "Condition evaluation failed");
        if self.condition_failure_sampler.try_acquire() {
            self.sink.condition_evaluation_failed(context, error);
        }
    }

    /// Charge processing overhead to the breaker; disables the probe on trip
    pub(crate) fn charge(&self, overhead: Duration) {
        if let Some(total) = self.breaker.record(overhead) {
            self.probe.disable();
            shield(&self.probe, "disable", || self.sink.probe_disabled(&self.probe, total));
        }
    }
}

/// Run probe-side work, converting a panic into a logged skip.
///
/// The host's own code never runs inside this.
pub(crate) fn shield<T>(probe: &Probe, phase: &str, work: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(value) => Some(value),
        Err(_) => {
            error!(probe_id = %probe.id(), phase, "Probe processing panicked, firing skipped");
            None
        }
    }
}

/// Field lookup for `@name` references against the receiver
pub(crate) fn receiver_field(receiver: Option<&Value>, name: &str) -> Option<Value> {
    if !name.starts_with('@') {
        return None;
    }
    match receiver? {
        Value::Object(object) => object
            .fields()
            .ok()?
            .into_iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value),
        _ => None,
    }
}

// ============================================================================
// Instrumenter
// ============================================================================

struct InstalledHook {
    token: InstallationToken,
    state: Arc<HookState>,
}

/// Installs and removes probe hooks
pub struct Instrumenter {
    target: InstrumentationTargetRef,
    registry: Arc<CodeRegistry>,
    serializer: Arc<Serializer>,
    settings: InstrumenterSettings,
    hooks: Mutex<HashMap<String, InstalledHook>>,
}

impl Instrumenter {
    pub fn new(
        target: InstrumentationTargetRef,
        registry: Arc<CodeRegistry>,
        serializer: Arc<Serializer>,
        settings: InstrumenterSettings,
    ) -> Self {
        Self {
            target,
            registry,
            serializer,
            settings,
            hooks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_hooks(&self) -> MutexGuard<'_, HashMap<String, InstalledHook>> {
        self.hooks.lock().unwrap_or_else(|e| {
            warn!("Instrumenter hook table lock poisoned, recovering");
            e.into_inner()
        })
    }

    pub fn settings(&self) -> &InstrumenterSettings {
        &self.settings
    }

    /// Hook a probe of either granularity
    pub fn hook(&self, probe: Arc<Probe>, sink: ProbeEventSinkRef) -> Result<()> {
        if probe.is_method() {
            self.hook_method(probe, sink)
        } else {
            self.hook_line(probe, sink)
        }
    }

    /// Wrap the probe's method.
    ///
    /// Fails with `TargetNotDefined` while the type or method does not exist.
    pub fn hook_method(&self, probe: Arc<Probe>, sink: ProbeEventSinkRef) -> Result<()> {
        let (type_name, method_name) = match (probe.type_name(), probe.method_name()) {
            (Some(t), Some(m)) => (t.to_string(), m.to_string()),
            _ => {
                return Err(Error::InvalidProbe(format!(
                    "probe {} is not a method probe",
                    probe.id()
                )))
            }
        };
        let target = HookTarget::Method {
            type_name,
            method_name,
        };
        self.install(probe, sink, target, |state| {
            Hook::Method(Arc::new(MethodProbeHook::new(state)))
        })
    }

    /// Hook the probe's line, targeted through the code registry when possible
    pub fn hook_line(&self, probe: Arc<Probe>, sink: ProbeEventSinkRef) -> Result<()> {
        let line_no = probe.line_no()?;
        let file = probe
            .file()
            .ok_or_else(|| Error::InvalidProbe(format!("probe {} has no file", probe.id())))?
            .to_string();

        let code = if self.registry.is_active() {
            self.registry.resolve(&file)?
        } else {
            None
        };

        let target = match code {
            Some(code) => HookTarget::Line {
                code: Some(code),
                file,
                line_no,
            },
            None if self.settings.untargeted_trace_points => {
                debug!(probe_id = %probe.id(), file = %file, "File not in registry, using untargeted line hook");
                HookTarget::Line {
                    code: None,
                    file,
                    line_no,
                }
            }
            // Code tracking stopped for good, no load will ever bring the file
            None if self.registry.is_stopped() => return Err(Error::TargetNotInRegistry(file)),
            // Not loaded yet, or tracking not started yet
            None => return Err(Error::TargetNotDefined(format!("{}:{}", file, line_no))),
        };

        let untargeted = target.is_untargeted();
        self.install(probe, sink, target, move |state| {
            Hook::Line(Arc::new(LineProbeHook::new(state, untargeted)))
        })
    }

    fn install(
        &self,
        probe: Arc<Probe>,
        sink: ProbeEventSinkRef,
        target: HookTarget,
        make_hook: impl FnOnce(Arc<HookState>) -> Hook,
    ) -> Result<()> {
        let mut hooks = self.lock_hooks();
        if hooks.contains_key(probe.id()) {
            return Err(Error::AlreadyInstrumented(probe.id().to_string()));
        }

        let code = self.target.resolve(&target)?;
        let state = Arc::new(HookState::new(
            Arc::clone(&probe),
            sink,
            Arc::clone(&self.serializer),
            &self.settings,
        ));
        let token = self.target.install(&code, make_hook(Arc::clone(&state)))?;

        info!(probe_id = %probe.id(), target = %target, "Probe hook installed");
        hooks.insert(probe.id().to_string(), InstalledHook { token, state });
        Ok(())
    }

    /// Remove a probe's hook. Returns false when the probe was not hooked.
    ///
    /// On failure the hook stays registered so the removal can be retried.
    pub fn unhook(&self, probe_id: &str) -> Result<bool> {
        let mut hooks = self.lock_hooks();
        let Some(installed) = hooks.get(probe_id) else {
            return Ok(false);
        };
        self.target.uninstall(&installed.token)?;
        hooks.remove(probe_id);
        debug!(probe_id, "Probe hook removed");
        Ok(true)
    }

    pub fn unhook_method(&self, probe: &Probe) -> Result<bool> {
        self.unhook(probe.id())
    }

    pub fn unhook_line(&self, probe: &Probe) -> Result<bool> {
        self.unhook(probe.id())
    }

    pub fn is_hooked(&self, probe_id: &str) -> bool {
        self.lock_hooks().contains_key(probe_id)
    }

    pub fn hooked_probe_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_hooks().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Circuit breaker counters of a hooked probe
    pub fn breaker_stats(&self, probe_id: &str) -> Option<CircuitBreakerStats> {
        self.lock_hooks()
            .get(probe_id)
            .map(|installed| installed.state.breaker.stats())
    }
}
