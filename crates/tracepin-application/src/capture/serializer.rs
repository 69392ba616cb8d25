//! Bounded, redacting value serializer
//!
//! Converts host [`Value`] trees into [`CapturedValue`] trees under the
//! capture bounds of a probe:
//!
//! - Names on the redaction list and redacted types are never inspected
//! - Composite values at `depth >= max_depth` are cut with reason `depth`
//! - Collections keep at most `max_collection_size` items (0 = unbounded)
//! - Objects keep at most `max_attribute_count` fields
//! - Strings keep at most `max_string_length` characters
//!
//! A failure while capturing one value (a reflection error or a panic in
//! host code) only affects that node.

use crate::capture::custom::CustomSerializers;
use crate::capture::redactor::Redactor;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracepin_core::{
    CaptureBounds, CapturedMap, CapturedValue, ExceptionCapture, HostException,
    NotCapturedReason, Value, UNNAMED_TYPE,
};
use tracing::debug;

/// Value serializer owning its redaction policy and custom serializers
#[derive(Debug, Clone)]
pub struct Serializer {
    redactor: Redactor,
    bounds: CaptureBounds,
    custom: CustomSerializers,
}

impl Serializer {
    pub fn new(redactor: Redactor, bounds: CaptureBounds) -> Self {
        Self {
            redactor,
            bounds,
            custom: CustomSerializers::new(),
        }
    }

    pub fn with_custom_serializers(mut self, custom: CustomSerializers) -> Self {
        self.custom = custom;
        self
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Global default bounds
    pub fn bounds(&self) -> CaptureBounds {
        self.bounds
    }

    /// Capture scope using `bounds` instead of the defaults
    pub fn capture(&self, bounds: CaptureBounds) -> Capture<'_> {
        Capture {
            serializer: self,
            bounds,
        }
    }

    /// Capture scope using the default bounds
    pub fn default_capture(&self) -> Capture<'_> {
        self.capture(self.bounds)
    }

    pub fn serialize_value(&self, name: Option<&str>, value: &Value) -> CapturedValue {
        self.default_capture().serialize_value(name, value)
    }

    pub fn serialize_args(&self, args: &[Value], kwargs: &[(String, Value)]) -> CapturedMap {
        self.default_capture().serialize_args(args, kwargs)
    }

    pub fn serialize_vars(&self, vars: &[(String, Value)]) -> CapturedMap {
        self.default_capture().serialize_vars(vars)
    }
}

/// One serialization pass under fixed bounds
#[derive(Clone, Copy)]
pub struct Capture<'a> {
    serializer: &'a Serializer,
    bounds: CaptureBounds,
}

impl<'a> Capture<'a> {
    pub fn bounds(&self) -> &CaptureBounds {
        &self.bounds
    }

    /// Serialize a top-level value bound to `name`
    pub fn serialize_value(&self, name: Option<&str>, value: &Value) -> CapturedValue {
        self.serialize_at(name, value, 0)
    }

    /// Text of `value` for a log message, under the same bounds and redaction
    pub fn message_text(&self, name: Option<&str>, value: &Value) -> String {
        self.serialize_at(name, value, 0).message_text()
    }

    /// Positional arguments become `arg1, arg2, ...`, followed by keyword
    /// arguments under their own names.
    pub fn serialize_args(&self, args: &[Value], kwargs: &[(String, Value)]) -> CapturedMap {
        let mut captured = CapturedMap::new();
        for (i, arg) in args.iter().enumerate() {
            let name = format!("arg{}", i + 1);
            let value = self.serialize_value(Some(&name), arg);
            captured.insert(name, value);
        }
        for (name, value) in kwargs {
            captured.insert(name.clone(), self.serialize_value(Some(name), value));
        }
        captured
    }

    pub fn serialize_vars(&self, vars: &[(String, Value)]) -> CapturedMap {
        let mut captured = CapturedMap::new();
        for (name, value) in vars {
            captured.insert(name.clone(), self.serialize_value(Some(name), value));
        }
        captured
    }

    /// Exception raised by an instrumented call
    pub fn serialize_exception(&self, exception: &HostException) -> ExceptionCapture {
        ExceptionCapture {
            type_name: exception.type_name.clone(),
            message: exception.message.clone(),
            fields: exception
                .value
                .as_ref()
                .map(|value| self.serialize_value(None, value)),
        }
    }

    /// Serialize a nested value at `depth`.
    ///
    /// Exposed for custom serializers that capture their own children.
    pub fn serialize_at(&self, name: Option<&str>, value: &Value, depth: usize) -> CapturedValue {
        match catch_unwind(AssertUnwindSafe(|| self.serialize_unguarded(name, value, depth))) {
            Ok(captured) => captured,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                debug!(name = ?name, reason = %reason, "Value capture panicked");
                CapturedValue::not_serialized(safe_type_name(value), reason)
            }
        }
    }

    fn serialize_unguarded(
        &self,
        name: Option<&str>,
        value: &Value,
        depth: usize,
    ) -> CapturedValue {
        let redactor = &self.serializer.redactor;
        if let Some(name) = name {
            if redactor.should_redact_identifier(name) {
                return CapturedValue::not_captured(value.type_name(), NotCapturedReason::RedactedIdent);
            }
        }
        if redactor.should_redact_type(value) {
            return CapturedValue::not_captured(value.type_name(), NotCapturedReason::RedactedType);
        }
        if let Some(custom) = self.serializer.custom.find(value) {
            return (**custom)(self, value, depth);
        }

        let type_name = value.type_name();
        match value {
            Value::Nil => CapturedValue::null(type_name),
            Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::Time(_) => {
                CapturedValue::primitive(type_name, value.primitive_text().unwrap_or_default())
            }
            Value::String(s) | Value::Symbol(s) => self.serialize_string(type_name.as_ref(), s),
            Value::Array(items) => {
                if depth >= self.bounds.max_depth {
                    return CapturedValue::not_captured(type_name, NotCapturedReason::Depth);
                }
                let limit = self.collection_limit(items.len());
                let elements = items
                    .iter()
                    .take(limit)
                    .map(|item| self.serialize_at(None, item, depth + 1))
                    .collect();
                let captured = CapturedValue::elements(type_name, elements);
                if limit < items.len() {
                    captured.with_collection_size(items.len())
                } else {
                    captured
                }
            }
            Value::Hash(pairs) => {
                if depth >= self.bounds.max_depth {
                    return CapturedValue::not_captured(type_name, NotCapturedReason::Depth);
                }
                let limit = self.collection_limit(pairs.len());
                let entries = pairs
                    .iter()
                    .take(limit)
                    .map(|(key, val)| {
                        let key_name = match key {
                            Value::String(s) | Value::Symbol(s) => Some(s.as_str()),
                            _ => None,
                        };
                        (
                            self.serialize_at(None, key, depth + 1),
                            self.serialize_at(key_name, val, depth + 1),
                        )
                    })
                    .collect();
                let captured = CapturedValue::entries(type_name, entries);
                if limit < pairs.len() {
                    captured.with_collection_size(pairs.len())
                } else {
                    captured
                }
            }
            Value::Object(object) => {
                if depth >= self.bounds.max_depth {
                    return CapturedValue::not_captured(type_name, NotCapturedReason::Depth);
                }
                let fields = match object.fields() {
                    Ok(fields) => fields,
                    Err(e) => return CapturedValue::not_serialized(type_name, e.to_string()),
                };
                let max = self.bounds.max_attribute_count;
                let mut captured = CapturedMap::new();
                for (field, field_value) in fields.iter().take(max) {
                    captured.insert(
                        field.clone(),
                        self.serialize_at(Some(field), field_value, depth + 1),
                    );
                }
                let result = CapturedValue::fields(type_name, captured);
                if fields.len() > max {
                    result.with_field_count_exceeded()
                } else {
                    result
                }
            }
        }
    }

    fn serialize_string(&self, type_name: &str, s: &str) -> CapturedValue {
        let max = self.bounds.max_string_length;
        let length = s.chars().count();
        if length > max {
            let kept: String = s.chars().take(max).collect();
            CapturedValue::truncated_string(type_name, kept, length)
        } else {
            CapturedValue::primitive(type_name, s)
        }
    }

    /// Number of items to keep; a zero limit keeps everything
    fn collection_limit(&self, len: usize) -> usize {
        match self.bounds.max_collection_size {
            0 => len,
            max => max.min(len),
        }
    }
}

fn safe_type_name(value: &Value) -> String {
    catch_unwind(AssertUnwindSafe(|| value.type_name().into_owned()))
        .unwrap_or_else(|_| UNNAMED_TYPE.to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic while capturing value".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::custom::CustomSerializers;
    use std::sync::Arc;
    use tracepin_config::RedactionConfig;
    use tracepin_core::{ObjectValue, Reflect, ReflectError};
    use tracepin_testing::fixtures;

    fn serializer() -> Serializer {
        Serializer::new(Redactor::default(), CaptureBounds::default())
    }

    fn reason(captured: &CapturedValue) -> Option<&'static str> {
        captured.not_captured_reason.map(|r| r.as_str())
    }

    #[derive(Debug)]
    struct BrokenObject;

    impl Reflect for BrokenObject {
        fn type_name(&self) -> Option<&str> {
            Some("Broken")
        }

        fn fields(&self) -> Result<Vec<(String, Value)>, ReflectError> {
            Err(ReflectError::new("connection reset"))
        }
    }

    #[derive(Debug)]
    struct PanickingObject;

    impl Reflect for PanickingObject {
        fn type_name(&self) -> Option<&str> {
            Some("Explosive")
        }

        fn fields(&self) -> Result<Vec<(String, Value)>, ReflectError> {
            panic!("boom")
        }
    }

    #[test]
    fn test_primitives() {
        let s = serializer();
        let nil = s.serialize_value(None, &Value::Nil);
        assert_eq!(nil.type_name, "Nil");
        assert!(nil.is_null);

        let int = s.serialize_value(None, &Value::from(42));
        assert_eq!(int.value.as_deref(), Some("42"));
        assert_eq!(int.type_name, "Integer");

        let b = s.serialize_value(None, &Value::from(true));
        assert_eq!(b.value.as_deref(), Some("true"));

        let sym = s.serialize_value(None, &Value::symbol("ok"));
        assert_eq!(sym.type_name, "Symbol");
        assert_eq!(sym.value.as_deref(), Some("ok"));
    }

    #[test]
    fn test_string_truncation() {
        let s = Serializer::new(
            Redactor::default(),
            CaptureBounds::default().with_max_string_length(5),
        );
        let captured = s.serialize_value(None, &Value::string("héllo world"));
        assert_eq!(captured.value.as_deref(), Some("héllo"));
        assert_eq!(captured.size, Some(11));
        assert!(captured.truncated);
        assert_eq!(reason(&captured), Some("length"));

        let short = s.serialize_value(None, &Value::string("hi"));
        assert!(!short.truncated);
        assert_eq!(short.size, None);
    }

    #[test]
    fn test_array_collection_bound() {
        let s = Serializer::new(
            Redactor::default(),
            CaptureBounds::default().with_max_collection_size(3),
        );
        let captured = s.serialize_value(None, &fixtures::large_array(1000));
        let elements = captured.elements.as_ref().unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[2].value.as_deref(), Some("2"));
        assert_eq!(reason(&captured), Some("collectionSize"));
        assert_eq!(captured.size, Some(1000));
    }

    #[test]
    fn test_zero_collection_limit_is_unbounded() {
        let s = Serializer::new(
            Redactor::default(),
            CaptureBounds::default().with_max_collection_size(0),
        );
        let captured = s.serialize_value(None, &fixtures::large_array(500));
        assert_eq!(captured.elements.as_ref().unwrap().len(), 500);
        assert_eq!(captured.not_captured_reason, None);
    }

    #[test]
    fn test_hash_entries_keep_order_and_bound() {
        let s = Serializer::new(
            Redactor::default(),
            CaptureBounds::default().with_max_collection_size(2),
        );
        let captured = s.serialize_value(None, &fixtures::large_hash(5));
        let entries = captured.entries.as_ref().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.value.as_deref(), Some("k0"));
        assert_eq!(entries[1].1.value.as_deref(), Some("1"));
        assert_eq!(reason(&captured), Some("collectionSize"));
        assert_eq!(captured.size, Some(5));
    }

    #[test]
    fn test_depth_cut_at_exact_level() {
        let s = Serializer::new(Redactor::default(), CaptureBounds::default().with_max_depth(3));
        let captured = s.serialize_value(None, &fixtures::nested_array(5));

        let mut node = &captured;
        for level in 0..3 {
            assert_eq!(node.not_captured_reason, None, "level {} was cut", level);
            node = &node.elements.as_ref().unwrap()[0];
        }
        assert_eq!(node.type_name, "Array");
        assert_eq!(reason(node), Some("depth"));
        assert!(node.elements.is_none());
    }

    #[test]
    fn test_zero_depth_cuts_top_level_composites_only() {
        let s = Serializer::new(Redactor::default(), CaptureBounds::default().with_max_depth(0));
        assert_eq!(reason(&s.serialize_value(None, &fixtures::large_array(2))), Some("depth"));
        assert_eq!(s.serialize_value(None, &Value::from(1)).value.as_deref(), Some("1"));
    }

    #[test]
    fn test_object_fields_and_field_count() {
        let s = Serializer::new(
            Redactor::default(),
            CaptureBounds::default().with_max_attribute_count(1),
        );
        let captured = s.serialize_value(None, &fixtures::sample_user());
        assert_eq!(captured.type_name, "User");
        let fields = captured.fields.as_ref().unwrap();
        assert_eq!(fields.names(), vec!["@name"]);
        assert_eq!(reason(&captured), Some("fieldCount"));
    }

    #[test]
    fn test_redacted_field_and_name() {
        let s = serializer();
        let captured = s.serialize_value(None, &fixtures::sample_user());
        let fields = captured.fields.as_ref().unwrap();
        let password = fields.get("@password").unwrap();
        assert_eq!(reason(password), Some("redactedIdent"));
        assert_eq!(password.value, None);
        assert_eq!(fields.get("@age").unwrap().value.as_deref(), Some("42"));

        let top = s.serialize_value(Some("password"), &Value::string("hunter2"));
        assert_eq!(top.type_name, "String");
        assert_eq!(reason(&top), Some("redactedIdent"));

        let kept = s.serialize_value(Some("pass/word"), &Value::string("hunter2"));
        assert_eq!(kept.value.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_hash_values_redacted_by_key() {
        let s = serializer();
        let hash = Value::hash(vec![("token", "abc"), ("user", "bob")]);
        let captured = s.serialize_value(None, &hash);
        let entries = captured.entries.as_ref().unwrap();
        assert_eq!(reason(&entries[0].1), Some("redactedIdent"));
        assert_eq!(entries[0].0.value.as_deref(), Some("token"));
        assert_eq!(entries[1].1.value.as_deref(), Some("bob"));
    }

    #[test]
    fn test_redacted_type() {
        let redactor = Redactor::new(&RedactionConfig {
            redacted_identifiers: vec![],
            redacted_type_names: vec!["Vault*".to_string()],
        });
        let s = Serializer::new(redactor, CaptureBounds::default());
        let captured = s.serialize_value(
            Some("store"),
            &ObjectValue::new("VaultClient").with_field("@key", 1).into_value(),
        );
        assert_eq!(captured.type_name, "VaultClient");
        assert_eq!(reason(&captured), Some("redactedType"));
        assert!(captured.fields.is_none());
    }

    #[test]
    fn test_unnamed_type() {
        let captured = serializer().serialize_value(None, &ObjectValue::anonymous().into_value());
        assert_eq!(captured.type_name, "[Unnamed type]");
    }

    #[test]
    fn test_reflection_failure_is_isolated() {
        let s = serializer();
        let value = Value::Array(vec![Value::object(BrokenObject), Value::from(7)]);
        let captured = s.serialize_value(None, &value);
        let elements = captured.elements.as_ref().unwrap();
        assert_eq!(elements[0].type_name, "Broken");
        assert_eq!(
            elements[0].not_serialized_reason.as_deref(),
            Some("connection reset")
        );
        assert_eq!(elements[1].value.as_deref(), Some("7"));
    }

    #[test]
    fn test_panic_is_isolated() {
        let s = serializer();
        let vars = vec![
            ("bomb".to_string(), Value::object(PanickingObject)),
            ("count".to_string(), Value::from(3)),
        ];
        let captured = s.serialize_vars(&vars);
        let bomb = captured.get("bomb").unwrap();
        assert_eq!(bomb.type_name, "Explosive");
        assert_eq!(bomb.not_serialized_reason.as_deref(), Some("boom"));
        assert_eq!(captured.get("count").unwrap().value.as_deref(), Some("3"));
    }

    #[test]
    fn test_serialize_args_names() {
        let s = serializer();
        let captured = s.serialize_args(
            &[Value::from(1), Value::string("two")],
            &[("flag".to_string(), Value::from(false))],
        );
        assert_eq!(captured.names(), vec!["arg1", "arg2", "flag"]);
        assert_eq!(captured.get("arg2").unwrap().value.as_deref(), Some("two"));
    }

    #[test]
    fn test_capture_is_independent_copy() {
        let s = serializer();
        let mut items = vec![Value::from(1)];
        let captured = s.serialize_value(None, &Value::Array(items.clone()));
        items.push(Value::from(2));
        assert_eq!(captured.elements.as_ref().unwrap().len(), 1);
        assert_eq!(captured, s.serialize_value(None, &Value::Array(vec![Value::from(1)])));
    }

    #[test]
    fn test_custom_serializer_first_match_wins() {
        let custom = CustomSerializers::new()
            .with(
                |v: &Value| v.type_name() == "Money",
                |_: &Capture<'_>, _: &Value, _: usize| CapturedValue::primitive("Money", "$5.00"),
            )
            .with(
                |v: &Value| !v.is_builtin(),
                |_: &Capture<'_>, v: &Value, _: usize| {
                    CapturedValue::primitive(v.type_name(), "generic")
                },
            );
        let s = serializer().with_custom_serializers(custom);

        let money = ObjectValue::new("Money").with_field("@cents", 500).into_value();
        assert_eq!(
            s.serialize_value(None, &money).value.as_deref(),
            Some("$5.00")
        );
        let other = ObjectValue::new("Other").into_value();
        assert_eq!(
            s.serialize_value(None, &other).value.as_deref(),
            Some("generic")
        );
        assert_eq!(s.serialize_value(None, &Value::from(1)).value.as_deref(), Some("1"));
    }

    #[test]
    fn test_custom_serializer_runs_after_redaction() {
        let custom = CustomSerializers::new().with(
            |_: &Value| true,
            |_: &Capture<'_>, _: &Value, _: usize| CapturedValue::primitive("Any", "custom"),
        );
        let s = serializer().with_custom_serializers(custom);
        let captured = s.serialize_value(Some("secret"), &Value::from(1));
        assert_eq!(reason(&captured), Some("redactedIdent"));
    }

    #[test]
    fn test_custom_serializer_panic_is_isolated() {
        let custom = CustomSerializers::new().with(
            |v: &Value| v.type_name() == "Money",
            |_: &Capture<'_>, _: &Value, _: usize| -> CapturedValue { panic!("bad serializer") },
        );
        let s = serializer().with_custom_serializers(custom);
        let captured = s.serialize_value(None, &ObjectValue::new("Money").into_value());
        assert_eq!(
            captured.not_serialized_reason.as_deref(),
            Some("bad serializer")
        );
    }

    #[test]
    fn test_exception_capture() {
        let s = serializer();
        let mut exception = HostException::new("ArgumentError", "bad input");
        exception.value = Some(ObjectValue::new("ArgumentError").with_field("@code", 3).into_value());
        let captured = s.default_capture().serialize_exception(&exception);
        assert_eq!(captured.type_name, "ArgumentError");
        assert_eq!(captured.message, "bad input");
        assert!(captured.fields.unwrap().fields.is_some());
    }

    #[test]
    fn test_shared_object_captured_per_reference() {
        let shared = Arc::new(ObjectValue::new("Node").with_field("@v", 1));
        let value = Value::Array(vec![Value::Object(shared.clone()), Value::Object(shared)]);
        let captured = serializer().serialize_value(None, &value);
        let elements = captured.elements.unwrap();
        assert_eq!(elements[0], elements[1]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use tracepin_core::CapturedValue;
        use tracepin_testing::proptest_config::{self, value_tree};

        /// Container levels that kept their children
        fn nesting(captured: &CapturedValue) -> usize {
            let children: Vec<&CapturedValue> = captured
                .elements
                .iter()
                .flatten()
                .chain(captured.entries.iter().flatten().map(|(_, v)| v))
                .chain(captured.fields.iter().flat_map(|f| f.iter().map(|(_, v)| v)))
                .collect();
            let has_children = captured.elements.is_some()
                || captured.entries.is_some()
                || captured.fields.is_some();
            if !has_children {
                return 0;
            }
            1 + children.into_iter().map(nesting).max().unwrap_or(0)
        }

        proptest! {
            #![proptest_config(proptest_config::capture_config())]

            #[test]
            fn prop_capture_never_nests_past_max_depth(value in value_tree(5), max_depth in 0usize..4) {
                let s = Serializer::new(
                    Redactor::default(),
                    CaptureBounds::default().with_max_depth(max_depth),
                );
                let captured = s.serialize_value(None, &value);
                prop_assert!(nesting(&captured) <= max_depth);
                prop_assert_eq!(&captured, &s.serialize_value(None, &value));
            }

            #[test]
            fn prop_serialization_is_deterministic(items in proptest::collection::vec(any::<i64>(), 0..50), limit in 0usize..20) {
                let s = Serializer::new(
                    Redactor::default(),
                    CaptureBounds::default().with_max_collection_size(limit),
                );
                let value = Value::from(items.clone());
                let first = s.serialize_value(None, &value);
                let second = s.serialize_value(None, &value);
                prop_assert_eq!(&first, &second);

                let kept = first.elements.as_ref().map(|e| e.len()).unwrap_or(0);
                if limit == 0 || items.len() <= limit {
                    prop_assert_eq!(kept, items.len());
                    prop_assert_eq!(first.size, None);
                } else {
                    prop_assert_eq!(kept, limit);
                    prop_assert_eq!(first.size, Some(items.len()));
                }
            }

            #[test]
            fn prop_string_never_exceeds_limit(text in ".{0,80}", limit in 0usize..40) {
                let s = Serializer::new(
                    Redactor::default(),
                    CaptureBounds::default().with_max_string_length(limit),
                );
                let captured = s.serialize_value(None, &Value::string(text.clone()));
                let kept = captured.value.as_deref().unwrap_or_default().chars().count();
                prop_assert!(kept <= limit);
                prop_assert_eq!(captured.truncated, text.chars().count() > limit);
            }
        }
    }
}
