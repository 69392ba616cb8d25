//! Runtime value mirror
//!
//! Hosts hand observed program state to the instrumentation layer as
//! [`Value`] trees. Composite host objects are exposed through the
//! [`Reflect`] trait so their fields are read lazily, and reading them
//! may fail without affecting sibling values.

use chrono::{DateTime, SecondsFormat, Utc};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Type name reported for objects whose type has no name.
pub const UNNAMED_TYPE: &str = "[Unnamed type]";

pub const TYPE_NIL: &str = "Nil";
pub const TYPE_BOOL: &str = "Bool";
pub const TYPE_INTEGER: &str = "Integer";
pub const TYPE_FLOAT: &str = "Float";
pub const TYPE_STRING: &str = "String";
pub const TYPE_SYMBOL: &str = "Symbol";
pub const TYPE_TIME: &str = "Time";
pub const TYPE_ARRAY: &str = "Array";
pub const TYPE_HASH: &str = "Hash";

/// Names of the built-in value types.
pub const BUILTIN_TYPE_NAMES: &[&str] = &[
    TYPE_NIL,
    TYPE_BOOL,
    TYPE_INTEGER,
    TYPE_FLOAT,
    TYPE_STRING,
    TYPE_SYMBOL,
    TYPE_TIME,
    TYPE_ARRAY,
    TYPE_HASH,
];

/// Failure while reading a host object's state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ReflectError(pub String);

impl ReflectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Read-only reflective view of a host object.
pub trait Reflect: Send + Sync + fmt::Debug {
    /// Fully-qualified type name, `None` for anonymous types
    fn type_name(&self) -> Option<&str>;

    /// The object's own exposed attributes, in declaration order
    fn fields(&self) -> Result<Vec<(String, Value)>, ReflectError>;
}

/// A value observed in the host program.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i128),
    Float(f64),
    String(String),
    Symbol(String),
    Time(DateTime<Utc>),
    Array(Vec<Value>),
    /// Key-value collection in insertion order
    Hash(Vec<(Value, Value)>),
    Object(Arc<dyn Reflect>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn symbol(s: impl Into<String>) -> Self {
        Value::Symbol(s.into())
    }

    pub fn object(object: impl Reflect + 'static) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn hash<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Value::Hash(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Runtime type name of the value
    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            Value::Nil => Cow::Borrowed(TYPE_NIL),
            Value::Bool(_) => Cow::Borrowed(TYPE_BOOL),
            Value::Integer(_) => Cow::Borrowed(TYPE_INTEGER),
            Value::Float(_) => Cow::Borrowed(TYPE_FLOAT),
            Value::String(_) => Cow::Borrowed(TYPE_STRING),
            Value::Symbol(_) => Cow::Borrowed(TYPE_SYMBOL),
            Value::Time(_) => Cow::Borrowed(TYPE_TIME),
            Value::Array(_) => Cow::Borrowed(TYPE_ARRAY),
            Value::Hash(_) => Cow::Borrowed(TYPE_HASH),
            Value::Object(obj) => Cow::Borrowed(obj.type_name().unwrap_or(UNNAMED_TYPE)),
        }
    }

    /// True for built-in types (everything except reflected objects)
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// `Nil` and `false` are falsy, everything else is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Text of a string-like value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Textual form used for primitive captures
    pub fn primitive_text(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) | Value::Symbol(s) => Some(s.clone()),
            Value::Time(t) => Some(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i128)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i as i128)
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Value::Integer(i)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Integer(i as i128)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Nil)
    }
}

// ============================================================================
// ObjectValue - ready-made reflective record
// ============================================================================

/// A plain named record implementing [`Reflect`].
///
/// Hosts without their own reflection layer can snapshot objects into this.
#[derive(Debug, Clone, Default)]
pub struct ObjectValue {
    type_name: Option<String>,
    fields: Vec<(String, Value)>,
}

impl ObjectValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            fields: Vec::new(),
        }
    }

    /// Object of an anonymous type
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn into_value(self) -> Value {
        Value::Object(Arc::new(self))
    }
}

impl Reflect for ObjectValue {
    fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    fn fields(&self) -> Result<Vec<(String, Value)>, ReflectError> {
        Ok(self.fields.clone())
    }
}

/// Exception raised by instrumented host code.
///
/// Carried through hooks untouched so the host sees exactly what it raised.
#[derive(Debug, Clone, PartialEq)]
pub struct HostException {
    pub type_name: String,
    pub message: String,
    /// Optional structured payload of the exception object
    pub value: Option<Value>,
}

impl HostException {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            value: None,
        }
    }
}

impl fmt::Display for HostException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for HostException {}
