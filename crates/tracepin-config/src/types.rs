//! Configuration types for tracepin
//!
//! # Module Organization
//!
//! - `capture` - Capture bounds and redaction lists
//! - `instrumentation` - Overhead budget and sampling
//! - `notifier` - Batching worker settings
//!
//! Service identity and logging settings live here.

use crate::constants::{DEFAULT_LOG_LEVEL, DEFAULT_SERVICE_NAME};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::capture::{CaptureConfig, RedactionConfig};
pub use crate::instrumentation::InstrumentationConfig;
pub use crate::notifier::NotifierConfig;

// ============================================================================
// Main Config
// ============================================================================

/// Main tracepin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub instrumentation: InstrumentationConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate every section, collecting all problems
    pub fn validate(&self) -> Result<(), String> {
        let mut all_errors = Vec::new();

        if self.service.name.trim().is_empty() {
            all_errors.push("service.name must not be empty".to_string());
        }
        all_errors.extend(self.redaction.validate());
        all_errors.extend(self.instrumentation.validate());
        all_errors.extend(self.notifier.validate());

        if all_errors.is_empty() {
            Ok(())
        } else {
            Err(all_errors.join("; "))
        }
    }
}

// ============================================================================
// Service Config
// ============================================================================

/// Identity reported in every outbound payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            env: None,
            version: None,
        }
    }
}

// ============================================================================
// Logging Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Force debug level for tracepin crates, ignoring RUST_LOG
    #[serde(default)]
    pub debug: bool,

    /// Write logs to a daily rolling file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            debug: false,
            file: None,
        }
    }
}
