//! Captured values: the bounded, serialized form of observed program state

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Why a value (or part of it) was left out of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotCapturedReason {
    /// Identifier name is on the redaction list
    RedactedIdent,
    /// Value type is on the redaction list
    RedactedType,
    /// Maximum nesting depth reached
    Depth,
    /// Collection longer than the size limit
    CollectionSize,
    /// Object has more attributes than the field limit
    FieldCount,
    /// String longer than the length limit
    Length,
}

impl NotCapturedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotCapturedReason::RedactedIdent => "redactedIdent",
            NotCapturedReason::RedactedType => "redactedType",
            NotCapturedReason::Depth => "depth",
            NotCapturedReason::CollectionSize => "collectionSize",
            NotCapturedReason::FieldCount => "fieldCount",
            NotCapturedReason::Length => "length",
        }
    }
}

/// One serialized value node. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedValue {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<CapturedValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<(CapturedValue, CapturedValue)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<CapturedMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_captured_reason: Option<NotCapturedReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_serialized_reason: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl CapturedValue {
    fn bare(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: None,
            is_null: false,
            elements: None,
            entries: None,
            fields: None,
            not_captured_reason: None,
            size: None,
            truncated: false,
            not_serialized_reason: None,
        }
    }

    /// `{type, value}`
    pub fn primitive(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::bare(type_name)
        }
    }

    /// `{type, isNull: true}`
    pub fn null(type_name: impl Into<String>) -> Self {
        Self {
            is_null: true,
            ..Self::bare(type_name)
        }
    }

    /// `{type, notCapturedReason}` with no contents
    pub fn not_captured(type_name: impl Into<String>, reason: NotCapturedReason) -> Self {
        Self {
            not_captured_reason: Some(reason),
            ..Self::bare(type_name)
        }
    }

    /// `{type, notSerializedReason}` for a value whose capture failed
    pub fn not_serialized(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            not_serialized_reason: Some(reason.into()),
            ..Self::bare(type_name)
        }
    }

    /// `{type, value, size, truncated, notCapturedReason: "length"}`
    pub fn truncated_string(
        type_name: impl Into<String>,
        value: impl Into<String>,
        original_size: usize,
    ) -> Self {
        Self {
            value: Some(value.into()),
            size: Some(original_size),
            truncated: true,
            not_captured_reason: Some(NotCapturedReason::Length),
            ..Self::bare(type_name)
        }
    }

    /// `{type, elements}`
    pub fn elements(type_name: impl Into<String>, elements: Vec<CapturedValue>) -> Self {
        Self {
            elements: Some(elements),
            ..Self::bare(type_name)
        }
    }

    /// `{type, entries}`
    pub fn entries(
        type_name: impl Into<String>,
        entries: Vec<(CapturedValue, CapturedValue)>,
    ) -> Self {
        Self {
            entries: Some(entries),
            ..Self::bare(type_name)
        }
    }

    /// `{type, fields}`
    pub fn fields(type_name: impl Into<String>, fields: CapturedMap) -> Self {
        Self {
            fields: Some(fields),
            ..Self::bare(type_name)
        }
    }

    /// Mark a collection as cut short at the size limit
    pub fn with_collection_size(mut self, original_size: usize) -> Self {
        self.not_captured_reason = Some(NotCapturedReason::CollectionSize);
        self.size = Some(original_size);
        self
    }

    /// Mark an object as cut short at the field limit
    pub fn with_field_count_exceeded(mut self) -> Self {
        self.not_captured_reason = Some(NotCapturedReason::FieldCount);
        self
    }

    /// Convert to a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Short human-readable rendering used inside log messages.
    ///
    /// Cut-off collections end in `...`, redacted values read `[redacted]`.
    pub fn message_text(&self) -> String {
        let mut out = String::new();
        self.write_message_text(&mut out);
        out
    }

    fn write_message_text(&self, out: &mut String) {
        match self.not_captured_reason {
            Some(NotCapturedReason::RedactedIdent) | Some(NotCapturedReason::RedactedType) => {
                out.push_str("[redacted]");
                return;
            }
            Some(NotCapturedReason::Depth) => {
                out.push_str("...");
                return;
            }
            _ => {}
        }
        if self.not_serialized_reason.is_some() {
            out.push_str("#<");
            out.push_str(&self.type_name);
            out.push('>');
            return;
        }
        if self.is_null {
            out.push_str("nil");
            return;
        }
        let cut = matches!(
            self.not_captured_reason,
            Some(NotCapturedReason::CollectionSize) | Some(NotCapturedReason::FieldCount)
        );

        if let Some(value) = &self.value {
            out.push_str(value);
            if self.truncated {
                out.push_str("...");
            }
        } else if let Some(elements) = &self.elements {
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                element.write_message_text(out);
            }
            if cut {
                out.push_str(if elements.is_empty() { "..." } else { ", ..." });
            }
            out.push(']');
        } else if let Some(entries) = &self.entries {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                key.write_message_text(out);
                out.push_str(" => ");
                value.write_message_text(out);
            }
            if cut {
                out.push_str(if entries.is_empty() { "..." } else { ", ..." });
            }
            out.push('}');
        } else if let Some(fields) = &self.fields {
            out.push_str("#<");
            out.push_str(&self.type_name);
            for (i, (name, value)) in fields.iter().enumerate() {
                out.push_str(if i == 0 { " " } else { ", " });
                out.push_str(name);
                out.push('=');
                value.write_message_text(out);
            }
            if cut {
                out.push_str(", ...");
            }
            out.push('>');
        } else {
            out.push_str("#<");
            out.push_str(&self.type_name);
            out.push('>');
        }
    }
}

// ============================================================================
// CapturedMap - ordered name -> capture map
// ============================================================================

/// Ordered mapping from names to captures.
///
/// Serialized as a JSON object preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedMap(Vec<(String, CapturedValue)>);

impl CapturedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a capture by name, keeping the first position
    pub fn insert(&mut self, name: impl Into<String>, value: CapturedValue) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CapturedValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CapturedValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl FromIterator<(String, CapturedValue)> for CapturedMap {
    fn from_iter<I: IntoIterator<Item = (String, CapturedValue)>>(iter: I) -> Self {
        let mut map = CapturedMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl Serialize for CapturedMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
