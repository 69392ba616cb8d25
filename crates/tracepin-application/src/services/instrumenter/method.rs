//! Method hook: condition, sampling and capture around one call

use super::{receiver_field, shield, HookState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracepin_core::condition::{REF_DURATION, REF_EXCEPTION, REF_RETURN};
use tracepin_core::{
    CapturedMap, CapturedValue, Completion, EvaluationScope, ExecutionContext, HostException,
    ObjectValue, StackFrame, Value,
};
use tracepin_ports::{CallOutcome, MethodCall, MethodHook};

/// Arguments are visible to conditions as `arg1..argN`, keywords by name
struct CallScope<'a> {
    call: &'a MethodCall,
}

impl EvaluationScope for CallScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if name == "self" {
            return self.call.receiver.clone();
        }
        if let Some(index) = name
            .strip_prefix("arg")
            .and_then(|n| n.parse::<usize>().ok())
        {
            if index >= 1 {
                if let Some(value) = self.call.args.get(index - 1) {
                    return Some(value.clone());
                }
            }
        }
        if let Some((_, value)) = self.call.kwargs.iter().rev().find(|(n, _)| n == name) {
            return Some(value.clone());
        }
        receiver_field(self.call.receiver.as_ref(), name)
    }
}

/// Call scope plus what is only known once the call has finished.
///
/// `@return` and `@exception` are `nil` for the outcome that did not happen,
/// `@duration` is in milliseconds.
struct ExitScope<'a> {
    call: CallScope<'a>,
    outcome: &'a CallOutcome,
    duration: Duration,
}

impl EvaluationScope for ExitScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            REF_RETURN => Some(self.outcome.as_ref().ok().cloned().unwrap_or(Value::Nil)),
            REF_EXCEPTION => Some(match self.outcome {
                Err(exception) => exception_value(exception),
                Ok(_) => Value::Nil,
            }),
            REF_DURATION => Some(Value::Float(self.duration.as_secs_f64() * 1000.0)),
            _ => self.call.lookup(name),
        }
    }
}

fn exception_value(exception: &HostException) -> Value {
    match &exception.value {
        Some(value) => value.clone(),
        None => ObjectValue::new(exception.type_name.clone())
            .with_field("message", exception.message.clone())
            .into_value(),
    }
}

/// Captured before the call proceeds
struct Entry {
    args: Option<CapturedMap>,
    receiver: Option<CapturedValue>,
}

pub(crate) struct MethodProbeHook {
    state: Arc<HookState>,
}

impl MethodProbeHook {
    pub(crate) fn new(state: Arc<HookState>) -> Self {
        Self { state }
    }

    fn frames(&self, call: &MethodCall) -> Vec<StackFrame> {
        let function = format!("{}.{}", call.type_name, call.method_name);
        let own = match (&call.source_file, call.source_line) {
            (Some(file), Some(line)) => StackFrame::new(file.clone(), function, line),
            _ => StackFrame::function(function),
        };
        let mut frames = Vec::with_capacity(call.caller_locations.len() + 1);
        frames.push(own);
        frames.extend(call.caller_locations.iter().cloned());
        frames
    }

    /// Condition and sampling. `None` means the firing is skipped.
    fn enter(&self, call: &MethodCall) -> Option<Entry> {
        let state = &self.state;
        let probe = state.probe();

        if let Some(condition) = probe.condition() {
            match condition.evaluate(&CallScope { call }) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(error) => {
                    let mut context = ExecutionContext::new(Arc::clone(probe));
                    context.caller_locations = self.frames(call);
                    state.emit_condition_failure(context, &error);
                    return None;
                }
            }
        }

        if !state.sample() {
            return None;
        }

        if !probe.capture_snapshot() {
            return Some(Entry {
                args: None,
                receiver: None,
            });
        }
        let capture = state.capture();
        Some(Entry {
            args: Some(capture.serialize_args(&call.args, &call.kwargs)),
            receiver: call
                .receiver
                .as_ref()
                .map(|receiver| capture.serialize_value(Some("self"), receiver)),
        })
    }

    fn report(&self, call: &MethodCall, entry: Entry, outcome: &CallOutcome, duration: Duration) {
        let state = &self.state;
        let probe = state.probe();
        let capture = state.capture();

        let completion = match outcome {
            Ok(value) => Completion::Returned {
                value: probe
                    .capture_snapshot()
                    .then(|| capture.serialize_value(Some("@return"), value)),
            },
            Err(exception) => Completion::Raised {
                exception: capture.serialize_exception(exception),
            },
        };

        let mut context = ExecutionContext::new(Arc::clone(probe));
        context.duration = duration;
        context.completion = Some(completion);
        context.serialized_entry_args = entry.args;
        context.serialized_receiver = entry.receiver;
        context.caller_locations = self.frames(call);
        context.path = call.source_file.clone();
        context.line_no = call.source_line;
        let scope = ExitScope {
            call: CallScope { call },
            outcome,
            duration,
        };
        state.render_message(&mut context, &scope);
        state.emit_executed(context);
    }
}

impl MethodHook for MethodProbeHook {
    fn around(&self, call: &MethodCall, proceed: &mut dyn FnMut() -> CallOutcome) -> CallOutcome {
        let state = &self.state;
        let probe = state.probe();
        if !probe.enabled() {
            return proceed();
        }

        let started = Instant::now();
        let entry = shield(probe, "entry", || self.enter(call)).flatten();
        let entry_overhead = started.elapsed();

        let Some(entry) = entry else {
            state.charge(entry_overhead);
            return proceed();
        };

        let call_started = Instant::now();
        let outcome = proceed();
        let duration = call_started.elapsed();

        let exit_started = Instant::now();
        shield(probe, "exit", || self.report(call, entry, &outcome, duration));
        state.charge(entry_overhead + exit_started.elapsed());

        outcome
    }
}
