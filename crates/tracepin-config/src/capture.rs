//! Capture bounds and redaction settings

use crate::constants::{
    DEFAULT_MAX_CAPTURE_ATTRIBUTE_COUNT, DEFAULT_MAX_CAPTURE_COLLECTION_SIZE,
    DEFAULT_MAX_CAPTURE_DEPTH, DEFAULT_MAX_CAPTURE_STRING_LENGTH,
};
use serde::{Deserialize, Serialize};
use tracepin_core::CaptureBounds;

// ============================================================================
// Capture Config
// ============================================================================

/// Global capture bounds applied to every probe unless overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_max_capture_depth")]
    pub max_capture_depth: usize,

    /// 0 means collections are never truncated
    #[serde(default = "default_max_capture_collection_size")]
    pub max_capture_collection_size: usize,

    #[serde(default = "default_max_capture_string_length")]
    pub max_capture_string_length: usize,

    #[serde(default = "default_max_capture_attribute_count")]
    pub max_capture_attribute_count: usize,
}

fn default_max_capture_depth() -> usize {
    DEFAULT_MAX_CAPTURE_DEPTH
}

fn default_max_capture_collection_size() -> usize {
    DEFAULT_MAX_CAPTURE_COLLECTION_SIZE
}

fn default_max_capture_string_length() -> usize {
    DEFAULT_MAX_CAPTURE_STRING_LENGTH
}

fn default_max_capture_attribute_count() -> usize {
    DEFAULT_MAX_CAPTURE_ATTRIBUTE_COUNT
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_capture_depth: DEFAULT_MAX_CAPTURE_DEPTH,
            max_capture_collection_size: DEFAULT_MAX_CAPTURE_COLLECTION_SIZE,
            max_capture_string_length: DEFAULT_MAX_CAPTURE_STRING_LENGTH,
            max_capture_attribute_count: DEFAULT_MAX_CAPTURE_ATTRIBUTE_COUNT,
        }
    }
}

impl CaptureConfig {
    /// Resolved bounds handed to the serializer
    pub fn to_bounds(&self) -> CaptureBounds {
        CaptureBounds {
            max_depth: self.max_capture_depth,
            max_attribute_count: self.max_capture_attribute_count,
            max_collection_size: self.max_capture_collection_size,
            max_string_length: self.max_capture_string_length,
        }
    }
}

// ============================================================================
// Redaction Config
// ============================================================================

/// User-supplied redaction lists, extending the built-in identifier list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Extra sensitive identifier names (normalized before comparison)
    #[serde(default)]
    pub redacted_identifiers: Vec<String>,

    /// Fully-qualified type names; a trailing `*` matches as a prefix
    #[serde(default)]
    pub redacted_type_names: Vec<String>,
}

impl RedactionConfig {
    pub(crate) fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for pattern in &self.redacted_type_names {
            let bare = pattern.trim_start_matches("::");
            if bare.is_empty() || bare == "*" {
                errors.push(format!(
                    "redaction.redacted_type_names entry '{}' matches every type",
                    pattern
                ));
            }
        }
        errors
    }
}
