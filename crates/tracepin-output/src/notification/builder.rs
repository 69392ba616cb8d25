//! Probe notification builder
//!
//! Pure payload construction: probe lifecycle statuses and execution snapshots.
//! Nothing here touches the network or any queue.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;
use tracepin_config::ServiceConfig;
use tracepin_core::{
    CaptureFrame, CapturedMap, Captures, Completion, Diagnostics, Error, EvaluationError,
    EvaluationErrorInfo, ExecutionContext, LoggerInfo, Probe, ProbeLocation, ProbeStatus,
    Snapshot, SnapshotDebugger, SnapshotLocation, SnapshotPayload, SnapshotProbe, StatusDebugger,
    StatusPayload, ThrowableCapture, DD_SOURCE, LOGGER_VERSION, SNAPSHOT_LANGUAGE,
};
use uuid::Uuid;

/// Name of the return value inside `return.arguments`
pub const RETURN_ARGUMENT: &str = "@return";

/// Name of the receiver inside capture arguments
pub const SELF_ARGUMENT: &str = "self";

/// Builds outbound payloads for one process
#[derive(Debug, Clone)]
pub struct ProbeNotificationBuilder {
    service: String,
    runtime_id: String,
}

impl ProbeNotificationBuilder {
    /// Builder for `service` with a fresh runtime id
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            runtime_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn from_settings(settings: &ServiceConfig) -> Self {
        Self::new(settings.name.clone())
    }

    /// Use a fixed runtime id
    pub fn with_runtime_id(mut self, runtime_id: impl Into<String>) -> Self {
        self.runtime_id = runtime_id.into();
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn runtime_id(&self) -> &str {
        &self.runtime_id
    }

    // ========================================================================
    // Status payloads
    // ========================================================================

    pub fn build_received(&self, probe: &Probe) -> StatusPayload {
        self.build_status(
            probe,
            format!("Probe {} has been received correctly", probe.id()),
            ProbeStatus::Received,
        )
    }

    pub fn build_installed(&self, probe: &Probe) -> StatusPayload {
        self.build_status(
            probe,
            format!("Probe {} has been instrumented correctly", probe.id()),
            ProbeStatus::Installed,
        )
    }

    pub fn build_emitting(&self, probe: &Probe) -> StatusPayload {
        self.build_status(
            probe,
            format!("Probe {} is emitting", probe.id()),
            ProbeStatus::Emitting,
        )
    }

    pub fn build_errored(&self, probe: &Probe, error: &Error) -> StatusPayload {
        self.build_status(
            probe,
            format!("Instrumentation for probe {} failed: {}", probe.id(), error),
            ProbeStatus::Error,
        )
    }

    /// Status for a probe disabled by its circuit breaker
    pub fn build_disabled(&self, probe: &Probe, overhead: Duration) -> StatusPayload {
        self.build_status(
            probe,
            format!(
                "Probe {} was disabled because it consumed {} seconds of CPU time in DI processing",
                probe.id(),
                overhead.as_secs_f64()
            ),
            ProbeStatus::Error,
        )
    }

    fn build_status(&self, probe: &Probe, message: String, status: ProbeStatus) -> StatusPayload {
        StatusPayload {
            service: self.service.clone(),
            timestamp: Utc::now().timestamp_millis(),
            message,
            ddsource: DD_SOURCE.to_string(),
            debugger: StatusDebugger {
                diagnostics: Diagnostics {
                    probe_id: probe.id().to_string(),
                    probe_version: probe.version(),
                    runtime_id: self.runtime_id.clone(),
                    parent_id: None,
                    status,
                },
            },
        }
    }

    // ========================================================================
    // Snapshot payloads
    // ========================================================================

    /// Snapshot for one probe firing
    pub fn build_executed(&self, context: &ExecutionContext) -> SnapshotPayload {
        let captures = if context.probe.capture_snapshot() {
            Some(build_captures(context))
        } else {
            None
        };
        self.build_snapshot(context, captures, Vec::new())
    }

    /// Snapshot reporting a condition that could not be evaluated
    pub fn build_condition_evaluation_failed(
        &self,
        context: &ExecutionContext,
        error: &EvaluationError,
    ) -> SnapshotPayload {
        let expr = context
            .probe
            .condition()
            .map(|c| c.dsl().to_string())
            .unwrap_or_default();
        let errors = vec![EvaluationErrorInfo {
            expr,
            message: error.to_string(),
        }];
        self.build_snapshot(context, None, errors)
    }

    fn build_snapshot(
        &self,
        context: &ExecutionContext,
        captures: Option<Captures>,
        mut evaluation_errors: Vec<EvaluationErrorInfo>,
    ) -> SnapshotPayload {
        let probe = &context.probe;
        let timestamp = context.fired_at.timestamp_millis();
        let message = context
            .message
            .clone()
            .or_else(|| probe.template().map(|t| t.source().to_string()))
            .unwrap_or_else(|| probe.location_label());
        evaluation_errors.extend(context.evaluation_errors.iter().cloned());

        let logger_name = match probe.location() {
            ProbeLocation::Method { type_name, .. } => Some(type_name.clone()),
            ProbeLocation::Line { file, .. } => {
                Some(context.path.clone().unwrap_or_else(|| file.clone()))
            }
        };

        SnapshotPayload {
            service: self.service.clone(),
            ddsource: DD_SOURCE.to_string(),
            message,
            timestamp,
            duration: u64::try_from(context.duration.as_nanos()).unwrap_or(u64::MAX),
            logger: LoggerInfo {
                name: logger_name,
                method: probe.method_name().map(str::to_string),
                thread_name: context.thread.name.clone(),
                thread_id: context.thread.id.clone(),
                version: LOGGER_VERSION,
            },
            debugger: SnapshotDebugger {
                snapshot: Snapshot {
                    id: Uuid::new_v4().to_string(),
                    timestamp,
                    evaluation_errors,
                    probe: SnapshotProbe {
                        id: probe.id().to_string(),
                        version: probe.version(),
                        location: snapshot_location(context),
                    },
                    language: SNAPSHOT_LANGUAGE.to_string(),
                    stack: context.caller_locations.clone(),
                    captures,
                },
            },
        }
    }
}

fn snapshot_location(context: &ExecutionContext) -> SnapshotLocation {
    match context.probe.location() {
        ProbeLocation::Method {
            type_name,
            method_name,
        } => SnapshotLocation {
            type_name: Some(type_name.clone()),
            method: Some(method_name.clone()),
            ..Default::default()
        },
        ProbeLocation::Line { file, line_no } => SnapshotLocation {
            file: Some(context.path.clone().unwrap_or_else(|| file.clone())),
            lines: Some(vec![line_no.to_string()]),
            ..Default::default()
        },
    }
}

fn build_captures(context: &ExecutionContext) -> Captures {
    match context.probe.location() {
        ProbeLocation::Method { .. } => {
            let mut return_arguments = CapturedMap::new();
            let mut throwable = None;
            match &context.completion {
                Some(Completion::Returned { value: Some(value) }) => {
                    return_arguments.insert(RETURN_ARGUMENT, value.clone());
                }
                Some(Completion::Raised { exception }) => {
                    throwable = Some(ThrowableCapture {
                        type_name: exception.type_name.clone(),
                        message: exception.message.clone(),
                        stacktrace: context.caller_locations.clone(),
                    });
                }
                _ => {}
            }
            if let Some(receiver) = &context.serialized_receiver {
                return_arguments.insert(SELF_ARGUMENT, receiver.clone());
            }

            Captures {
                entry: Some(CaptureFrame {
                    arguments: Some(context.serialized_entry_args.clone().unwrap_or_default()),
                    ..Default::default()
                }),
                return_: Some(CaptureFrame {
                    arguments: Some(return_arguments),
                    throwable,
                    ..Default::default()
                }),
                lines: None,
            }
        }
        ProbeLocation::Line { line_no, .. } => {
            let line = context.line_no.unwrap_or(*line_no);
            let arguments = context.serialized_receiver.as_ref().map(|receiver| {
                let mut arguments = CapturedMap::new();
                arguments.insert(SELF_ARGUMENT, receiver.clone());
                arguments
            });
            let mut lines = BTreeMap::new();
            lines.insert(
                line.to_string(),
                CaptureFrame {
                    arguments,
                    locals: Some(context.locals.clone().unwrap_or_default()),
                    throwable: None,
                },
            );
            Captures {
                entry: None,
                return_: None,
                lines: Some(lines),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracepin_core::{
        CapturedValue, Condition, ExceptionCapture, ProbeType, StackFrame, VariableScope,
    };

    fn builder() -> ProbeNotificationBuilder {
        ProbeNotificationBuilder::new("checkout").with_runtime_id("rt-1")
    }

    fn method_probe(capture: bool) -> Arc<Probe> {
        Arc::new(
            Probe::builder("p1", ProbeType::Log)
                .version(4)
                .method("Billing", "charge")
                .capture_snapshot(capture)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_status_messages() {
        let builder = builder();
        let probe = method_probe(false);

        let received = builder.build_received(&probe);
        assert_eq!(received.message, "Probe p1 has been received correctly");
        assert_eq!(received.status(), ProbeStatus::Received);
        assert_eq!(received.debugger.diagnostics.runtime_id, "rt-1");
        assert_eq!(received.debugger.diagnostics.probe_version, 4);
        assert_eq!(received.service, "checkout");

        assert_eq!(
            builder.build_installed(&probe).message,
            "Probe p1 has been instrumented correctly"
        );
        assert_eq!(builder.build_emitting(&probe).message, "Probe p1 is emitting");

        let errored = builder.build_errored(&probe, &Error::instrumentation("boom"));
        assert_eq!(errored.status(), ProbeStatus::Error);
        assert!(errored
            .message
            .starts_with("Instrumentation for probe p1 failed: "));
        assert!(errored.message.contains("boom"));
    }

    #[test]
    fn test_disabled_message() {
        let payload = builder().build_disabled(&method_probe(false), Duration::from_millis(1500));
        assert_eq!(
            payload.message,
            "Probe p1 was disabled because it consumed 1.5 seconds of CPU time in DI processing"
        );
        assert_eq!(payload.status(), ProbeStatus::Error);
    }

    #[test]
    fn test_executed_method_snapshot() {
        let mut context = ExecutionContext::new(method_probe(true));
        context.duration = Duration::from_micros(3);
        let mut args = CapturedMap::new();
        args.insert("arg1", CapturedValue::primitive("Integer", "10"));
        context.serialized_entry_args = Some(args);
        context.serialized_receiver = Some(CapturedValue::primitive("Billing", "#<Billing>"));
        context.completion = Some(Completion::Returned {
            value: Some(CapturedValue::primitive("Integer", "20")),
        });
        context.caller_locations = vec![StackFrame::new("billing.rb", "charge", 12)];

        let payload = builder().build_executed(&context);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["duration"], 3000);
        assert_eq!(json["message"], "Billing.charge");
        assert_eq!(json["logger"]["name"], "Billing");
        assert_eq!(json["logger"]["method"], "charge");
        assert_eq!(json["logger"]["version"], 2);
        let snapshot = &json["debugger"]["snapshot"];
        assert_eq!(snapshot["language"], "rust");
        assert_eq!(snapshot["probe"]["location"]["type"], "Billing");
        assert_eq!(snapshot["probe"]["location"]["method"], "charge");
        assert_eq!(snapshot["stack"][0]["lineNumber"], 12);
        assert_eq!(
            snapshot["captures"]["entry"]["arguments"]["arg1"]["value"],
            "10"
        );
        assert_eq!(
            snapshot["captures"]["return"]["arguments"]["@return"]["value"],
            "20"
        );
        assert_eq!(
            snapshot["captures"]["return"]["arguments"]["self"]["type"],
            "Billing"
        );
        assert!(Uuid::parse_str(snapshot["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_executed_exception_snapshot() {
        let mut context = ExecutionContext::new(method_probe(true));
        context.completion = Some(Completion::Raised {
            exception: ExceptionCapture {
                type_name: "CardDeclined".to_string(),
                message: "insufficient funds".to_string(),
                fields: None,
            },
        });

        let payload = builder().build_executed(&context);
        let captures = payload.snapshot().captures.as_ref().unwrap();
        let throwable = captures
            .return_
            .as_ref()
            .and_then(|r| r.throwable.as_ref())
            .unwrap();
        assert_eq!(throwable.type_name, "CardDeclined");
        assert_eq!(throwable.message, "insufficient funds");
    }

    #[test]
    fn test_executed_without_snapshot_has_no_captures() {
        let context = ExecutionContext::new(method_probe(false));
        let payload = builder().build_executed(&context);
        assert!(payload.snapshot().captures.is_none());
        assert!(payload.snapshot().evaluation_errors.is_empty());
    }

    #[test]
    fn test_executed_line_snapshot() {
        let probe = Arc::new(
            Probe::builder("line-1", ProbeType::Log)
                .line("app/cart.rb", 7)
                .capture_snapshot(true)
                .template("cart updated")
                .build()
                .unwrap(),
        );
        let mut context = ExecutionContext::new(probe);
        context.path = Some("/srv/app/cart.rb".to_string());
        context.line_no = Some(7);
        let mut locals = CapturedMap::new();
        locals.insert("total", CapturedValue::primitive("Float", "9.5"));
        context.locals = Some(locals);

        let json = serde_json::to_value(builder().build_executed(&context)).unwrap();
        assert_eq!(json["message"], "cart updated");
        assert_eq!(json["logger"]["name"], "/srv/app/cart.rb");
        let snapshot = &json["debugger"]["snapshot"];
        assert_eq!(snapshot["probe"]["location"]["file"], "/srv/app/cart.rb");
        assert_eq!(snapshot["probe"]["location"]["lines"][0], "7");
        assert_eq!(
            snapshot["captures"]["lines"]["7"]["locals"]["total"]["value"],
            "9.5"
        );
        assert!(snapshot["captures"].get("entry").is_none());
    }

    #[test]
    fn test_rendered_message_and_template_errors_reach_snapshot() {
        let probe = Arc::new(
            Probe::builder("tpl-1", ProbeType::Log)
                .method("Billing", "charge")
                .template("charged {@return} to {card}")
                .build()
                .unwrap(),
        );
        let mut context = ExecutionContext::new(probe);
        context.message = Some("charged 5 to [evaluation error]".to_string());
        context.evaluation_errors = vec![EvaluationErrorInfo {
            expr: "card".to_string(),
            message: "Cannot find symbol card".to_string(),
        }];

        let json = serde_json::to_value(builder().build_executed(&context)).unwrap();
        assert_eq!(json["message"], "charged 5 to [evaluation error]");
        assert!(json["logger"]["thread_id"]
            .as_str()
            .map_or(false, |id| id.parse::<u64>().is_ok()));
        let errors = &json["debugger"]["snapshot"]["evaluationErrors"];
        assert_eq!(errors[0]["expr"], "card");
        assert_eq!(errors[0]["message"], "Cannot find symbol card");
    }

    #[test]
    fn test_unrendered_template_falls_back_to_source() {
        let probe = Arc::new(
            Probe::builder("tpl-2", ProbeType::Log)
                .method("Billing", "charge")
                .template("charged {@return}")
                .build()
                .unwrap(),
        );
        let payload = builder().build_executed(&ExecutionContext::new(probe));
        assert_eq!(payload.message, "charged {@return}");
    }

    #[test]
    fn test_condition_evaluation_failed_snapshot() {
        let condition = Condition::parse(
            "missing > 1",
            serde_json::json!({"gt": [{"ref": "missing"}, 1]}),
        )
        .unwrap();
        let probe = Arc::new(
            Probe::builder("p2", ProbeType::Log)
                .method("A", "b")
                .capture_snapshot(true)
                .condition(condition)
                .build()
                .unwrap(),
        );
        let context = ExecutionContext::new(probe);
        let error = probe_condition_error(&context);

        let payload = builder().build_condition_evaluation_failed(&context, &error);
        let snapshot = payload.snapshot();
        assert!(snapshot.captures.is_none());
        assert_eq!(snapshot.evaluation_errors.len(), 1);
        assert_eq!(snapshot.evaluation_errors[0].expr, "missing > 1");
        assert_eq!(
            snapshot.evaluation_errors[0].message,
            "Cannot find symbol missing"
        );
    }

    fn probe_condition_error(context: &ExecutionContext) -> EvaluationError {
        context
            .probe
            .condition()
            .unwrap()
            .evaluate(&VariableScope::new())
            .unwrap_err()
    }
}
