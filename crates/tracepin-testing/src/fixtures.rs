//! Test fixtures and sample data factories
//!
//! ```rust,ignore
//! use tracepin_testing::fixtures;
//!
//! let probe = fixtures::method_probe("p1", "Billing", "charge");
//! let config = fixtures::fast_config();
//! ```

use std::sync::Arc;
use tracepin_config::Config;
use tracepin_core::{ObjectValue, Probe, ProbeType, Value};

/// Log probe on `type_name.method_name`
pub fn method_probe(id: &str, type_name: &str, method_name: &str) -> Probe {
    Probe::builder(id, ProbeType::Log)
        .method(type_name, method_name)
        .build()
        .expect("valid method probe")
}

/// Log probe on `type_name.method_name` capturing snapshots
pub fn snapshot_method_probe(id: &str, type_name: &str, method_name: &str) -> Probe {
    Probe::builder(id, ProbeType::Log)
        .method(type_name, method_name)
        .capture_snapshot(true)
        .build()
        .expect("valid method probe")
}

/// Log probe on `file:line_no`
pub fn line_probe(id: &str, file: &str, line_no: u32) -> Probe {
    Probe::builder(id, ProbeType::Log)
        .line(file, line_no)
        .build()
        .expect("valid line probe")
}

/// Log probe on `file:line_no` capturing snapshots
pub fn snapshot_line_probe(id: &str, file: &str, line_no: u32) -> Probe {
    Probe::builder(id, ProbeType::Log)
        .line(file, line_no)
        .capture_snapshot(true)
        .build()
        .expect("valid line probe")
}

pub fn shared(probe: Probe) -> Arc<Probe> {
    Arc::new(probe)
}

/// Firings per second high enough that sampling never interferes in tests
pub const UNLIMITED_RATE: f64 = 1_000_000.0;

/// Default config with a short notifier interval and effectively unlimited sampling
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.service.name = "test-service".to_string();
    config.notifier.min_send_interval_ms = 50;
    config.instrumentation.snapshot_rate_limit = UNLIMITED_RATE;
    config.instrumentation.log_rate_limit = UNLIMITED_RATE;
    config.instrumentation.condition_failure_rate_limit = UNLIMITED_RATE;
    config.instrumentation.max_processing_time_ms = 60_000;
    config
}

/// Hash with `size` integer entries keyed `"k0".."kN"`
pub fn large_hash(size: usize) -> Value {
    Value::hash((0..size).map(|i| (Value::string(format!("k{}", i)), Value::from(i))))
}

/// Integers `0..size`
pub fn large_array(size: usize) -> Value {
    Value::Array((0..size).map(Value::from).collect())
}

/// Arrays nested `levels` deep around a single integer
pub fn nested_array(levels: usize) -> Value {
    let mut value = Value::from(1);
    for _ in 0..levels {
        value = Value::Array(vec![value]);
    }
    value
}

/// A small record with a sensitive field
pub fn sample_user() -> Value {
    ObjectValue::new("User")
        .with_field("@name", "alice")
        .with_field("@password", "hunter2")
        .with_field("@age", 42)
        .into_value()
}
