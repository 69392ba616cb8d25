//! Source location value objects: probe locations, stack frames and path suffix matching

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a probe is attached: a method on a type, or a line in a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeLocation {
    Method {
        type_name: String,
        method_name: String,
    },
    Line {
        file: String,
        line_no: u32,
    },
}

impl ProbeLocation {
    pub fn method(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        ProbeLocation::Method {
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }

    pub fn line(file: impl Into<String>, line_no: u32) -> Self {
        ProbeLocation::Line {
            file: file.into(),
            line_no,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self, ProbeLocation::Method { .. })
    }

    pub fn is_line(&self) -> bool {
        matches!(self, ProbeLocation::Line { .. })
    }
}

/// Human-readable form: `Type.method` or `file:line`
impl fmt::Display for ProbeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeLocation::Method {
                type_name,
                method_name,
            } => write!(f, "{}.{}", type_name, method_name),
            ProbeLocation::Line { file, line_no } => write!(f, "{}:{}", file, line_no),
        }
    }
}

/// One frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

impl StackFrame {
    pub fn new(file_name: impl Into<String>, function: impl Into<String>, line_number: u32) -> Self {
        Self {
            file_name: Some(file_name.into()),
            function: Some(function.into()),
            line_number: Some(line_number),
        }
    }

    /// Frame known only by function name (e.g. a method entry point)
    pub fn function(function: impl Into<String>) -> Self {
        Self {
            file_name: None,
            function: Some(function.into()),
            line_number: None,
        }
    }
}

/// Check whether `path` ends with `suffix` on a path-component boundary.
///
/// `foo/bar.rs` matches `/x/foo/bar.rs`, but `ar.rs` does not match
/// `/x/bar.rs`. An absolute suffix only matches the identical path.
/// A leading `./` on the suffix is ignored.
pub fn path_matches_suffix(path: &str, suffix: &str) -> bool {
    let suffix = suffix.strip_prefix("./").unwrap_or(suffix);
    if suffix.is_empty() {
        return false;
    }
    if path == suffix {
        return true;
    }
    if suffix.starts_with('/') {
        return false;
    }
    match path.strip_suffix(suffix) {
        Some(prefix) => prefix.ends_with('/'),
        None => false,
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn segment() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,8}"
    }

    proptest! {
        #[test]
        fn proptest_any_trailing_components_match(
            dirs in prop::collection::vec(segment(), 1..5),
            file in segment(),
            keep in 1usize..5,
        ) {
            let mut parts = dirs.clone();
            parts.push(format!("{}.rs", file));
            let path = format!("/{}", parts.join("/"));
            let keep = keep.min(parts.len());
            let suffix = parts[parts.len() - keep..].join("/");
            prop_assert!(path_matches_suffix(&path, &suffix));
        }

        #[test]
        fn proptest_chopped_first_char_never_matches(
            dirs in prop::collection::vec(segment(), 1..4),
            file in "[a-z]{2,8}",
        ) {
            let path = format!("/{}/{}.rs", dirs.join("/"), file);
            let suffix = format!("{}.rs", &file[1..]);
            prop_assert!(!path_matches_suffix(&path, &suffix));
        }
    }
}
