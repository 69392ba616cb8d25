//! Instrumentation settings: overhead budget and sampling

use crate::constants::{
    DEFAULT_CONDITION_FAILURE_RATE_LIMIT, DEFAULT_LOG_RATE_LIMIT, DEFAULT_MAX_PROCESSING_TIME_MS,
    DEFAULT_SNAPSHOT_RATE_LIMIT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Allow process-wide line hooks for files missing from the code registry
    #[serde(default)]
    pub untargeted_trace_points: bool,

    /// Cumulative processing budget per probe. 0 disables a probe after its
    /// first firing.
    #[serde(default = "default_max_processing_time_ms")]
    pub max_processing_time_ms: u64,

    /// Default firings per second for probes capturing snapshots
    #[serde(default = "default_snapshot_rate_limit")]
    pub snapshot_rate_limit: f64,

    /// Default firings per second for probes without snapshot capture
    #[serde(default = "default_log_rate_limit")]
    pub log_rate_limit: f64,

    #[serde(default = "default_condition_failure_rate_limit")]
    pub condition_failure_rate_limit: f64,
}

fn default_max_processing_time_ms() -> u64 {
    DEFAULT_MAX_PROCESSING_TIME_MS
}

fn default_snapshot_rate_limit() -> f64 {
    DEFAULT_SNAPSHOT_RATE_LIMIT
}

fn default_log_rate_limit() -> f64 {
    DEFAULT_LOG_RATE_LIMIT
}

fn default_condition_failure_rate_limit() -> f64 {
    DEFAULT_CONDITION_FAILURE_RATE_LIMIT
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            untargeted_trace_points: false,
            max_processing_time_ms: DEFAULT_MAX_PROCESSING_TIME_MS,
            snapshot_rate_limit: DEFAULT_SNAPSHOT_RATE_LIMIT,
            log_rate_limit: DEFAULT_LOG_RATE_LIMIT,
            condition_failure_rate_limit: DEFAULT_CONDITION_FAILURE_RATE_LIMIT,
        }
    }
}

impl InstrumentationConfig {
    pub fn max_processing_time(&self) -> Duration {
        Duration::from_millis(self.max_processing_time_ms)
    }

    pub(crate) fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let rates = [
            ("snapshot_rate_limit", self.snapshot_rate_limit),
            ("log_rate_limit", self.log_rate_limit),
            (
                "condition_failure_rate_limit",
                self.condition_failure_rate_limit,
            ),
        ];
        for (name, rate) in rates {
            if !rate.is_finite() || rate < 0.0 {
                errors.push(format!(
                    "instrumentation.{} must be a finite non-negative number",
                    name
                ));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_rate_rejected() {
        let config = InstrumentationConfig {
            log_rate_limit: -1.0,
            snapshot_rate_limit: f64::NAN,
            ..Default::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("snapshot_rate_limit"));
        assert!(errors[1].contains("log_rate_limit"));
    }

    #[test]
    fn test_zero_rate_is_valid() {
        let config = InstrumentationConfig {
            log_rate_limit: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_empty());
        assert_eq!(config.max_processing_time(), Duration::from_millis(500));
    }
}
