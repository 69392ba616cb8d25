//! Line hook: fires when the probe's line executes

use super::{receiver_field, shield, HookState};
use std::sync::Arc;
use std::time::Instant;
use tracepin_core::{EvaluationScope, ExecutionContext, Value};
use tracepin_ports::{LineEvent, LineHook};

/// Locals by name, `self` for the receiver
struct LineScope<'a> {
    event: &'a LineEvent,
}

impl EvaluationScope for LineScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if name == "self" {
            return self.event.receiver.clone();
        }
        if let Some((_, value)) = self.event.locals.iter().rev().find(|(n, _)| n == name) {
            return Some(value.clone());
        }
        receiver_field(self.event.receiver.as_ref(), name)
    }
}

pub(crate) struct LineProbeHook {
    state: Arc<HookState>,
    /// Installed process-wide; events for other lines must be filtered out
    untargeted: bool,
}

impl LineProbeHook {
    pub(crate) fn new(state: Arc<HookState>, untargeted: bool) -> Self {
        Self { state, untargeted }
    }

    fn is_own_line(&self, event: &LineEvent) -> bool {
        let probe = self.state.probe();
        if probe.line_no().ok() != Some(event.line_no) {
            return false;
        }
        !self.untargeted || probe.file_matches(&event.path)
    }

    fn fire(&self, event: &LineEvent) {
        let state = &self.state;
        let probe = state.probe();

        let mut context = ExecutionContext::new(Arc::clone(probe));
        context.path = Some(event.path.clone());
        context.line_no = Some(event.line_no);
        context.caller_locations = event.caller_locations.clone();

        if let Some(condition) = probe.condition() {
            match condition.evaluate(&LineScope { event }) {
                Ok(true) => {}
                Ok(false) => return,
                Err(error) => {
                    state.emit_condition_failure(context, &error);
                    return;
                }
            }
        }

        if !state.sample() {
            return;
        }

        if probe.capture_snapshot() {
            let capture = state.capture();
            context.locals = Some(capture.serialize_vars(&event.locals));
            context.serialized_receiver = event
                .receiver
                .as_ref()
                .map(|receiver| capture.serialize_value(Some("self"), receiver));
        }
        state.render_message(&mut context, &LineScope { event });
        state.emit_executed(context);
    }
}

impl LineHook for LineProbeHook {
    fn on_line(&self, event: &LineEvent) {
        let probe = self.state.probe();
        if !probe.enabled() || !self.is_own_line(event) {
            return;
        }

        let started = Instant::now();
        shield(probe, "line", || self.fire(event));
        self.state.charge(started.elapsed());
    }
}
