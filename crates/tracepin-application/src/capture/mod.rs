//! Value capture: redaction policy, bounded serializer, custom serializers

pub mod custom;
pub mod redactor;
pub mod serializer;

pub use custom::{CustomSerializerFn, CustomSerializers, ValuePredicate};
pub use redactor::{normalize_identifier, Redactor, DEFAULT_REDACTED_IDENTIFIERS};
pub use serializer::{Capture, Serializer};
