//! Notifier worker settings: batching interval, queue sizes, timeouts

use crate::constants::{
    DEFAULT_MIN_SEND_INTERVAL_MS, DEFAULT_SNAPSHOT_QUEUE_CAPACITY, DEFAULT_STATUS_QUEUE_CAPACITY,
    DEFAULT_STOP_TIMEOUT_MS, DEFAULT_TRANSPORT_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Background flushes never run more often than this
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,

    #[serde(default = "default_snapshot_queue_capacity")]
    pub snapshot_queue_capacity: usize,

    #[serde(default = "default_status_queue_capacity")]
    pub status_queue_capacity: usize,

    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,

    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_min_send_interval_ms() -> u64 {
    DEFAULT_MIN_SEND_INTERVAL_MS
}

fn default_snapshot_queue_capacity() -> usize {
    DEFAULT_SNAPSHOT_QUEUE_CAPACITY
}

fn default_status_queue_capacity() -> usize {
    DEFAULT_STATUS_QUEUE_CAPACITY
}

fn default_transport_timeout_ms() -> u64 {
    DEFAULT_TRANSPORT_TIMEOUT_MS
}

fn default_stop_timeout_ms() -> u64 {
    DEFAULT_STOP_TIMEOUT_MS
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            min_send_interval_ms: DEFAULT_MIN_SEND_INTERVAL_MS,
            snapshot_queue_capacity: DEFAULT_SNAPSHOT_QUEUE_CAPACITY,
            status_queue_capacity: DEFAULT_STATUS_QUEUE_CAPACITY,
            transport_timeout_ms: DEFAULT_TRANSPORT_TIMEOUT_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl NotifierConfig {
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub(crate) fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.min_send_interval_ms == 0 {
            errors.push("notifier.min_send_interval_ms must be greater than 0".to_string());
        }
        if self.snapshot_queue_capacity == 0 {
            errors.push("notifier.snapshot_queue_capacity must be greater than 0".to_string());
        }
        if self.status_queue_capacity == 0 {
            errors.push("notifier.status_queue_capacity must be greater than 0".to_string());
        }
        if self.transport_timeout_ms == 0 {
            errors.push("notifier.transport_timeout_ms must be greater than 0".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        let config = NotifierConfig::default();
        assert_eq!(config.min_send_interval(), Duration::from_secs(1));
        assert_eq!(config.transport_timeout(), Duration::from_secs(2));
        assert_eq!(config.stop_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = NotifierConfig {
            snapshot_queue_capacity: 0,
            min_send_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 2);
    }
}
