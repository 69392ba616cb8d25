//! End-to-end dynamic instrumentation tests
//!
//! Drives `DynamicInstrumentation` against the in-memory `FakeRuntime` and
//! `MockTransport`: remote probe snapshots in, hook firings in the host,
//! payloads out of the notifier.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --package tracepin-application --test end_to_end -- --nocapture
//! ```

use serde_json::{json, Value as Json};
use std::sync::Arc;
use std::time::Duration;
use tracepin_application::{
    CodeRegistry, DynamicInstrumentation, Instrumenter, InstrumenterSettings, Redactor,
    Serializer,
};
use tracepin_config::Config;
use tracepin_core::{CaptureBounds, NotCapturedReason, ProbeStatus, Value};
use tracepin_ports::{LineEvent, MethodCall};
use tracepin_testing::fixtures::{self, UNLIMITED_RATE};
use tracepin_testing::{FakeRuntime, MockTransport, RecordingSink};

// ============================================================================
// Test Helpers
// ============================================================================

struct Agent {
    runtime: Arc<FakeRuntime>,
    transport: Arc<MockTransport>,
    di: DynamicInstrumentation,
}

fn agent_with(config: Config) -> Agent {
    tracepin_logging::init_test();
    let runtime = FakeRuntime::shared();
    let transport = Arc::new(MockTransport::new());
    let di = DynamicInstrumentation::new(&config, runtime.clone(), transport.clone())
        .expect("valid config");
    Agent {
        runtime,
        transport,
        di,
    }
}

fn agent() -> Agent {
    agent_with(fixtures::fast_config())
}

fn method_def(id: &str, type_name: &str, method_name: &str, snapshot: bool) -> Json {
    json!({
        "id": id,
        "version": 1,
        "type": "LOG_PROBE",
        "where": {"typeName": type_name, "methodName": method_name},
        "captureSnapshot": snapshot,
    })
}

fn line_def(id: &str, file: &str, line: u32) -> Json {
    json!({
        "id": id,
        "version": 1,
        "type": "LOG_PROBE",
        "where": {"sourceFile": file, "lines": [line.to_string()]},
        "captureSnapshot": true,
    })
}

fn snapshot_json(agent: &Agent, index: usize) -> Json {
    serde_json::to_value(&agent.transport.snapshots()[index]).unwrap()
}

fn statuses_of(agent: &Agent, probe_id: &str) -> Vec<ProbeStatus> {
    agent
        .transport
        .statuses()
        .iter()
        .filter(|s| s.debugger.diagnostics.probe_id == probe_id)
        .map(|s| s.debugger.diagnostics.status)
        .collect()
}

// ============================================================================
// Capture
// ============================================================================

#[test]
fn test_oversized_hash_argument_is_truncated_in_context() {
    let runtime = FakeRuntime::shared();
    let instrumenter = Instrumenter::new(
        runtime.clone(),
        Arc::new(CodeRegistry::new()),
        Arc::new(Serializer::new(
            Redactor::default(),
            CaptureBounds::default().with_max_collection_size(3),
        )),
        InstrumenterSettings {
            untargeted_trace_points: false,
            max_processing_time: Duration::from_secs(3600),
            snapshot_rate_limit: UNLIMITED_RATE,
            log_rate_limit: UNLIMITED_RATE,
            condition_failure_rate_limit: UNLIMITED_RATE,
        },
    );
    let sink = Arc::new(RecordingSink::new());
    runtime.define_type("Orders", &["import"]);
    instrumenter
        .hook_method(
            fixtures::shared(fixtures::snapshot_method_probe("p1", "Orders", "import")),
            sink.clone(),
        )
        .unwrap();

    runtime
        .call_method(
            MethodCall::new("Orders", "import").with_arg(fixtures::large_hash(10)),
            || Ok(Value::Nil),
        )
        .unwrap();

    let executions = sink.executions();
    assert_eq!(executions.len(), 1);
    let args = executions[0].serialized_entry_args.as_ref().unwrap();
    let arg = args.get("arg1").unwrap();
    assert_eq!(arg.type_name, "Hash");
    assert_eq!(arg.entries.as_ref().unwrap().len(), 3);
    assert_eq!(arg.not_captured_reason, Some(NotCapturedReason::CollectionSize));
    assert_eq!(arg.size, Some(10));
}

#[tokio::test]
async fn test_oversized_hash_argument_reaches_backend_truncated() {
    let mut config = fixtures::fast_config();
    config.capture.max_capture_collection_size = 3;
    let agent = agent_with(config);
    agent.runtime.define_type("Orders", &["import"]);

    let report = agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Orders", "import", true)])
        .unwrap();
    assert_eq!(report.installed, vec!["p1"]);

    agent
        .runtime
        .call_method(
            MethodCall::new("Orders", "import").with_arg(fixtures::large_hash(1000)),
            || Ok(Value::from(1000)),
        )
        .unwrap();
    agent.di.notifier().flush().await.unwrap();

    let snapshot = snapshot_json(&agent, 0);
    let captures = &snapshot["debugger"]["snapshot"]["captures"];
    let arg = &captures["entry"]["arguments"]["arg1"];
    assert_eq!(arg["type"], "Hash");
    assert_eq!(arg["entries"].as_array().unwrap().len(), 3);
    assert_eq!(arg["notCapturedReason"], "collectionSize");
    assert_eq!(arg["size"], 1000);
    assert_eq!(captures["return"]["arguments"]["@return"]["value"], "1000");
}

#[tokio::test]
async fn test_sensitive_arguments_are_redacted() {
    let agent = agent();
    agent.runtime.define_type("Session", &["login"]);
    agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Session", "login", true)])
        .unwrap();

    agent
        .runtime
        .call_method(
            MethodCall::new("Session", "login")
                .with_kwarg("user", "alice")
                .with_kwarg("password", "hunter2")
                .with_arg(fixtures::sample_user()),
            || Ok(Value::Bool(true)),
        )
        .unwrap();
    agent.di.notifier().flush().await.unwrap();

    let snapshot = snapshot_json(&agent, 0);
    let args = &snapshot["debugger"]["snapshot"]["captures"]["entry"]["arguments"];
    assert_eq!(args["user"]["value"], "alice");
    assert_eq!(args["password"]["notCapturedReason"], "redactedIdent");
    assert!(args["password"].get("value").is_none());
    assert_eq!(
        args["arg1"]["fields"]["@password"]["notCapturedReason"],
        "redactedIdent"
    );
    assert_eq!(args["arg1"]["fields"]["@name"]["value"], "alice");
}

// ============================================================================
// Probe lifecycle
// ============================================================================

#[tokio::test]
async fn test_status_sequence_for_installed_probe() {
    let agent = agent();
    agent.runtime.define_type("Billing", &["charge"]);
    agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Billing", "charge", false)])
        .unwrap();

    for _ in 0..3 {
        agent
            .runtime
            .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::Nil))
            .unwrap();
    }
    agent.di.notifier().flush().await.unwrap();

    assert_eq!(
        statuses_of(&agent, "p1"),
        vec![
            ProbeStatus::Received,
            ProbeStatus::Installed,
            ProbeStatus::Emitting
        ]
    );
    assert_eq!(agent.transport.snapshots().len(), 3);
    assert_eq!(agent.transport.batches().len(), 1);
}

#[tokio::test]
async fn test_pending_method_probe_installed_when_type_defined() {
    let agent = agent();
    let report = agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Billing", "charge", false)])
        .unwrap();
    assert_eq!(report.pending, vec!["p1"]);
    assert_eq!(agent.di.probe_manager().pending_probe_ids(), vec!["p1"]);

    agent.runtime.define_type("Billing", &["charge"]);
    assert_eq!(agent.di.on_type_defined("Billing"), 1);
    assert_eq!(agent.di.probe_manager().installed_probe_ids(), vec!["p1"]);

    agent
        .runtime
        .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::Nil))
        .unwrap();
    agent.di.notifier().flush().await.unwrap();
    assert_eq!(agent.transport.snapshots().len(), 1);
    assert_eq!(
        statuses_of(&agent, "p1"),
        vec![
            ProbeStatus::Received,
            ProbeStatus::Installed,
            ProbeStatus::Emitting
        ]
    );
}

#[tokio::test]
async fn test_line_probe_installed_on_code_load() {
    let agent = agent();
    agent.di.start().unwrap();

    let report = agent
        .di
        .apply_probe_snapshot(&[line_def("l1", "app/cart.rb", 7)])
        .unwrap();
    assert_eq!(report.pending, vec!["l1"]);

    let unit = agent.runtime.define_file("/srv/app/cart.rb", &[7, 8]);
    assert_eq!(agent.di.on_code_loaded("/srv/app/cart.rb", unit), 1);

    agent
        .runtime
        .execute_line(LineEvent::new("/srv/app/cart.rb", 7).with_local("total", 42));
    agent
        .runtime
        .execute_line(LineEvent::new("/srv/app/cart.rb", 8).with_local("total", 43));
    agent.di.notifier().flush().await.unwrap();

    let snapshots = agent.transport.snapshots();
    assert_eq!(snapshots.len(), 1);
    let snapshot = snapshot_json(&agent, 0);
    assert_eq!(
        snapshot["debugger"]["snapshot"]["captures"]["lines"]["7"]["locals"]["total"]["value"],
        "42"
    );
    agent.di.shutdown().await;
}

#[tokio::test]
async fn test_line_definition_received_before_start_waits_for_code_load() {
    let agent = agent();
    let report = agent
        .di
        .apply_probe_snapshot(&[line_def("l1", "app/cart.rb", 7)])
        .unwrap();
    assert_eq!(report.pending, vec!["l1"]);
    assert!(report.failed.is_empty());

    agent.di.start().unwrap();
    let unit = agent.runtime.define_file("/srv/app/cart.rb", &[7]);
    assert_eq!(agent.di.on_code_loaded("/srv/app/cart.rb", unit), 1);
    assert_eq!(agent.di.probe_manager().installed_probe_ids(), vec!["l1"]);
    assert!(agent.di.probe_manager().failed_probes().is_empty());

    agent
        .runtime
        .execute_line(LineEvent::new("/srv/app/cart.rb", 7).with_local("total", 3));
    agent.di.notifier().flush().await.unwrap();
    assert_eq!(agent.transport.snapshots().len(), 1);
    assert_eq!(
        statuses_of(&agent, "l1"),
        vec![
            ProbeStatus::Received,
            ProbeStatus::Installed,
            ProbeStatus::Emitting
        ]
    );
    agent.di.shutdown().await;
}

#[tokio::test]
async fn test_removed_probe_stops_firing() {
    let agent = agent();
    agent.runtime.define_type("Billing", &["charge"]);
    agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Billing", "charge", false)])
        .unwrap();

    let report = agent.di.apply_probe_snapshot(&[]).unwrap();
    assert_eq!(report.removed, vec!["p1"]);
    assert_eq!(agent.runtime.installed_hooks(), 0);

    agent
        .runtime
        .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::Nil))
        .unwrap();
    agent.di.notifier().flush().await.unwrap();
    assert!(agent.transport.snapshots().is_empty());
}

// ============================================================================
// Safety
// ============================================================================

#[tokio::test]
async fn test_zero_budget_disables_probe_after_one_firing() {
    let mut config = fixtures::fast_config();
    config.instrumentation.max_processing_time_ms = 0;
    let agent = agent_with(config);
    agent.runtime.define_type("Billing", &["charge"]);
    agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Billing", "charge", true)])
        .unwrap();

    for i in 0..10 {
        let outcome = agent
            .runtime
            .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::from(i)));
        assert_eq!(outcome.unwrap(), Value::from(i));
    }
    agent.di.notifier().flush().await.unwrap();

    assert_eq!(agent.transport.snapshots().len(), 1);
    let disabled: Vec<String> = agent
        .transport
        .status_messages()
        .into_iter()
        .filter(|m| m.contains("was disabled because"))
        .collect();
    assert_eq!(disabled.len(), 1);
    assert!(disabled[0].starts_with("Probe p1 was disabled"));
}

#[tokio::test]
async fn test_large_budget_counts_every_firing() {
    let agent = agent();
    agent.runtime.define_type("Billing", &["charge"]);
    agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Billing", "charge", false)])
        .unwrap();

    for _ in 0..50 {
        agent
            .runtime
            .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::Nil))
            .unwrap();
    }
    agent.di.notifier().flush().await.unwrap();

    assert_eq!(agent.transport.snapshots().len(), 50);
    let stats = agent.di.instrumenter().breaker_stats("p1").unwrap();
    assert_eq!(stats.firings, 50);
    assert!(!stats.tripped);
    assert!(agent.di.probe_manager().probe("p1").unwrap().enabled());
}

#[tokio::test]
async fn test_condition_failure_reaches_backend() {
    let agent = agent();
    agent.runtime.define_type("Billing", &["charge"]);
    let mut def = method_def("p1", "Billing", "charge", false);
    def["when"] = json!({"dsl": "ghost > 1", "json": {"gt": [{"ref": "ghost"}, 1]}});
    agent.di.apply_probe_snapshot(&[def]).unwrap();

    let outcome = agent
        .runtime
        .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::from(5)));
    assert_eq!(outcome.unwrap(), Value::from(5));
    agent.di.notifier().flush().await.unwrap();

    let snapshot = snapshot_json(&agent, 0);
    let errors = snapshot["debugger"]["snapshot"]["evaluationErrors"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["expr"], "ghost > 1");
    assert!(snapshot["debugger"]["snapshot"].get("captures").is_none());
}

#[tokio::test]
async fn test_message_template_evaluated_per_call() {
    let agent = agent();
    agent.runtime.define_type("Billing", &["charge"]);
    let mut def = method_def("p1", "Billing", "charge", false);
    def["template"] = json!("charged {@return} to {ghost}");
    def["segments"] = json!([
        {"str": "charged "},
        {"dsl": "@return", "json": {"ref": "@return"}},
        {"str": " to "},
        {"dsl": "ghost", "json": {"ref": "ghost"}}
    ]);
    agent.di.apply_probe_snapshot(&[def]).unwrap();

    for amount in [5i64, 7] {
        let outcome = agent
            .runtime
            .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::from(amount)));
        assert_eq!(outcome.unwrap(), Value::from(amount));
    }
    agent.di.notifier().flush().await.unwrap();

    let first = snapshot_json(&agent, 0);
    assert_eq!(first["message"], "charged 5 to [evaluation error]");
    assert_eq!(snapshot_json(&agent, 1)["message"], "charged 7 to [evaluation error]");
    let errors = first["debugger"]["snapshot"]["evaluationErrors"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["expr"], "ghost");
    assert_eq!(errors[0]["message"], "Cannot find symbol ghost");
}

// ============================================================================
// Transport and shutdown
// ============================================================================

#[tokio::test]
async fn test_failed_send_is_retried() {
    let agent = agent();
    agent.runtime.define_type("Billing", &["charge"]);
    agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Billing", "charge", false)])
        .unwrap();
    agent
        .runtime
        .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::Nil))
        .unwrap();

    agent.transport.set_failing(true);
    assert!(agent.di.notifier().flush().await.is_err());
    assert!(agent.transport.snapshots().is_empty());

    agent.transport.set_failing(false);
    agent.di.notifier().flush().await.unwrap();
    assert_eq!(agent.transport.snapshots().len(), 1);
    assert_eq!(
        statuses_of(&agent, "p1"),
        vec![
            ProbeStatus::Received,
            ProbeStatus::Installed,
            ProbeStatus::Emitting
        ]
    );
}

#[tokio::test]
async fn test_shutdown_unhooks_and_flushes() {
    let agent = agent();
    agent.di.start().unwrap();
    agent.runtime.define_type("Billing", &["charge"]);
    agent
        .di
        .apply_probe_snapshot(&[method_def("p1", "Billing", "charge", false)])
        .unwrap();
    agent
        .runtime
        .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::Nil))
        .unwrap();

    agent.di.shutdown().await;
    assert_eq!(agent.runtime.installed_hooks(), 0);
    assert!(!agent.di.notifier().is_running());
    assert_eq!(agent.transport.snapshots().len(), 1);

    // Host keeps running normally after shutdown
    let outcome = agent
        .runtime
        .call_method(MethodCall::new("Billing", "charge"), || Ok(Value::from(1)));
    assert_eq!(outcome.unwrap(), Value::from(1));
    assert_eq!(agent.transport.snapshots().len(), 1);
}
