//! Capture bounds: limits applied while serializing observed values

use serde::{Deserialize, Serialize};

/// Resolved capture limits.
///
/// `max_collection_size == 0` means collections are never truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureBounds {
    pub max_depth: usize,
    pub max_attribute_count: usize,
    pub max_collection_size: usize,
    pub max_string_length: usize,
}

impl Default for CaptureBounds {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_attribute_count: 20,
            max_collection_size: 100,
            max_string_length: 255,
        }
    }
}

impl CaptureBounds {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_attribute_count(mut self, count: usize) -> Self {
        self.max_attribute_count = count;
        self
    }

    pub fn with_max_collection_size(mut self, size: usize) -> Self {
        self.max_collection_size = size;
        self
    }

    pub fn with_max_string_length(mut self, length: usize) -> Self {
        self.max_string_length = length;
        self
    }
}

/// Per-probe overrides of the global capture bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOverrides {
    pub max_depth: Option<usize>,
    pub max_attribute_count: Option<usize>,
    pub max_collection_size: Option<usize>,
    pub max_string_length: Option<usize>,
}

impl CaptureOverrides {
    /// Resolve against global defaults: set fields win, unset fall back
    pub fn apply_to(&self, defaults: CaptureBounds) -> CaptureBounds {
        CaptureBounds {
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            max_attribute_count: self
                .max_attribute_count
                .unwrap_or(defaults.max_attribute_count),
            max_collection_size: self
                .max_collection_size
                .unwrap_or(defaults.max_collection_size),
            max_string_length: self.max_string_length.unwrap_or(defaults.max_string_length),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
