//! Proptest settings and runtime-value generators for tracepin property tests
//!
//! Case counts come from `TRACEPIN_PROPTEST_CASES`, then `PROPTEST_CASES`,
//! then the default of each config.
//!
//! ```rust,ignore
//! use tracepin_testing::proptest_config::{self, value_tree};
//!
//! proptest! {
//!     #![proptest_config(proptest_config::capture_config())]
//!
//!     #[test]
//!     fn capture_is_bounded(value in value_tree(4)) {
//!         // ...
//!     }
//! }
//! ```

use proptest::prelude::*;
use tracepin_core::{ObjectValue, Value};

/// Env var overriding the case count of every config here
pub const CASES_VAR: &str = "TRACEPIN_PROPTEST_CASES";

fn cases_from_env(default: u32) -> u32 {
    [CASES_VAR, "PROPTEST_CASES"]
        .iter()
        .find_map(|var| std::env::var(var).ok()?.trim().parse().ok())
        .unwrap_or(default)
}

/// Serializer properties. Value trees shrink slowly, so shrinking is capped.
pub fn capture_config() -> ProptestConfig {
    ProptestConfig {
        cases: cases_from_env(128),
        max_shrink_iters: 512,
        ..ProptestConfig::default()
    }
}

/// Nil, booleans, integers, floats and short strings
pub fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::Float),
        "[a-z ]{0,40}".prop_map(Value::from),
    ]
}

/// Arrays, symbol-keyed hashes and `Node` objects nested up to `depth` levels
pub fn value_tree(depth: u32) -> impl Strategy<Value = Value> {
    scalar_value().prop_recursive(depth, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{1,8}", inner.clone()), 0..6).prop_map(|pairs| {
                Value::Hash(
                    pairs
                        .into_iter()
                        .map(|(key, value)| (Value::Symbol(key), value))
                        .collect(),
                )
            }),
            prop::collection::vec(("@[a-z]{1,8}", inner), 0..6).prop_map(|fields| {
                fields
                    .into_iter()
                    .fold(ObjectValue::new("Node"), |node, (name, value)| {
                        node.with_field(name, value)
                    })
                    .into_value()
            }),
        ]
    })
}
