//! Default constants for tracepin configuration
//!
//! Single source of truth for default values. Everything that is
//! configurable should be here.
//!
//! # Organization
//!
//! - Service: reported identity
//! - Capture: serialization bounds
//! - Instrumentation: overhead budget and sampling
//! - Notifier: batching, queues and timeouts
//! - Logging

// ============================================================================
// ENVIRONMENT VARIABLES
// ============================================================================

/// Config file path override
pub const ENV_TRACEPIN_CONFIG: &str = "TRACEPIN_CONFIG";

/// Default config file name
pub const DEFAULT_CONFIG_FILENAME: &str = "tracepin.toml";

// ============================================================================
// SERVICE
// ============================================================================

/// Service name reported when none is configured
pub const DEFAULT_SERVICE_NAME: &str = "unnamed-service";

// ============================================================================
// CAPTURE
// ============================================================================

/// Maximum nesting depth of captured values
pub const DEFAULT_MAX_CAPTURE_DEPTH: usize = 3;

/// Maximum elements/entries captured per collection (0 = unbounded)
pub const DEFAULT_MAX_CAPTURE_COLLECTION_SIZE: usize = 100;

/// Maximum characters captured per string
pub const DEFAULT_MAX_CAPTURE_STRING_LENGTH: usize = 255;

/// Maximum attributes captured per object
pub const DEFAULT_MAX_CAPTURE_ATTRIBUTE_COUNT: usize = 20;

// ============================================================================
// INSTRUMENTATION
// ============================================================================

/// Cumulative processing budget per probe before it is disabled
pub const DEFAULT_MAX_PROCESSING_TIME_MS: u64 = 500;

/// Firings per second for probes capturing snapshots
pub const DEFAULT_SNAPSHOT_RATE_LIMIT: f64 = 1.0;

/// Firings per second for log probes without snapshots
pub const DEFAULT_LOG_RATE_LIMIT: f64 = 5000.0;

/// Condition-evaluation-failure reports per second per probe
pub const DEFAULT_CONDITION_FAILURE_RATE_LIMIT: f64 = 1.0;

// ============================================================================
// NOTIFIER
// ============================================================================

/// Minimum interval between two background flushes
pub const DEFAULT_MIN_SEND_INTERVAL_MS: u64 = 1_000;

/// Snapshot queue capacity
pub const DEFAULT_SNAPSHOT_QUEUE_CAPACITY: usize = 100;

/// Status queue capacity
pub const DEFAULT_STATUS_QUEUE_CAPACITY: usize = 100;

/// Timeout applied to each transport call
pub const DEFAULT_TRANSPORT_TIMEOUT_MS: u64 = 2_000;

/// Bounded wait for the background loop on stop
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// LOGGING
// ============================================================================

/// Default log level when RUST_LOG is not set
pub const DEFAULT_LOG_LEVEL: &str = "info";
