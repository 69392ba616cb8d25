//! Custom serializer registry
//!
//! Lets hosts replace the default capture of specific values (ORM records,
//! proxies, lazily loaded collections). Entries are tried in registration
//! order and the first matching predicate wins.
//!
//! Custom serializers run on the instrumented call path: they must be fast
//! and must not call back into instrumented code.

use crate::capture::serializer::Capture;
use std::fmt;
use std::sync::Arc;
use tracepin_core::{CapturedValue, Value};

/// Selects the values a custom serializer handles
pub type ValuePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Produces the capture for a matched value.
///
/// Receives the active [`Capture`] (to serialize nested values under the same
/// bounds and redaction rules) and the current depth.
pub type CustomSerializerFn =
    Arc<dyn Fn(&Capture<'_>, &Value, usize) -> CapturedValue + Send + Sync>;

#[derive(Clone)]
struct Entry {
    predicate: ValuePredicate,
    serializer: CustomSerializerFn,
}

/// Ordered list of `(predicate, serializer)` pairs
#[derive(Clone, Default)]
pub struct CustomSerializers {
    entries: Vec<Entry>,
}

impl CustomSerializers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P, S>(&mut self, predicate: P, serializer: S)
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        S: Fn(&Capture<'_>, &Value, usize) -> CapturedValue + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            predicate: Arc::new(predicate),
            serializer: Arc::new(serializer),
        });
    }

    /// Builder form of [`register`](Self::register)
    pub fn with<P, S>(mut self, predicate: P, serializer: S) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        S: Fn(&Capture<'_>, &Value, usize) -> CapturedValue + Send + Sync + 'static,
    {
        self.register(predicate, serializer);
        self
    }

    /// First serializer whose predicate accepts `value`
    pub(crate) fn find(&self, value: &Value) -> Option<&CustomSerializerFn> {
        self.entries
            .iter()
            .find(|entry| (entry.predicate)(value))
            .map(|entry| &entry.serializer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CustomSerializers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomSerializers")
            .field("entries", &self.entries.len())
            .finish()
    }
}
