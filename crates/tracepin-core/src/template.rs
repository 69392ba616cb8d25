//! Log message templates
//!
//! A template is literal text interleaved with expressions evaluated at
//! firing time. Remote definitions carry it as a `segments` list where
//! each entry is either `{"str": "..."}` or `{"dsl": "...", "json": {...}}`.
//! A plain template string may reference variables as `{name}`.

use crate::condition::{EvaluationScope, Expr};
use crate::entities::{EvaluationErrorInfo, Value};
use crate::error::{Error, Result};
use serde_json::Value as Json;

/// Substituted for a segment that failed to evaluate
pub const EVALUATION_ERROR_TEXT: &str = "[evaluation error]";

#[derive(Debug, Clone)]
pub enum TemplateSegment {
    Literal(String),
    Expression { dsl: String, expr: Expr },
}

impl TemplateSegment {
    fn same_as(&self, other: &TemplateSegment) -> bool {
        match (self, other) {
            (TemplateSegment::Literal(a), TemplateSegment::Literal(b)) => a == b,
            (
                TemplateSegment::Expression { dsl: a, .. },
                TemplateSegment::Expression { dsl: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Message produced by one firing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
    pub errors: Vec<EvaluationErrorInfo>,
}

/// Parsed message template
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    source: String,
    segments: Vec<TemplateSegment>,
}

impl MessageTemplate {
    /// Parse `{name}` placeholders out of template text.
    ///
    /// Placeholder contents that are not a plain (optionally `@`-prefixed)
    /// identifier stay literal, braces included.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source.as_str();

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                break;
            };
            let inner = after[..close].trim();
            literal.push_str(&rest[..open]);
            if is_reference(inner) {
                if !literal.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(TemplateSegment::Expression {
                    dsl: inner.to_string(),
                    expr: Expr::Ref(inner.to_string()),
                });
            } else {
                literal.push_str(&rest[open..open + close + 2]);
            }
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(TemplateSegment::Literal(literal));
        }

        Self { source, segments }
    }

    /// Build from a remote `segments` list.
    ///
    /// Without `source`, the template text is reassembled from the segments.
    pub fn from_segments(source: Option<String>, segments: &[Json]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(segments.len());
        for segment in segments {
            if let Some(text) = segment.get("str").and_then(Json::as_str) {
                parsed.push(TemplateSegment::Literal(text.to_string()));
                continue;
            }
            match (segment.get("dsl").and_then(Json::as_str), segment.get("json")) {
                (Some(dsl), Some(json)) => parsed.push(TemplateSegment::Expression {
                    dsl: dsl.to_string(),
                    expr: Expr::from_json(json)?,
                }),
                _ => {
                    return Err(Error::InvalidProbe(format!(
                        "invalid template segment: {}",
                        segment
                    )))
                }
            }
        }

        let source = source.unwrap_or_else(|| {
            parsed
                .iter()
                .map(|segment| match segment {
                    TemplateSegment::Literal(text) => text.clone(),
                    TemplateSegment::Expression { dsl, .. } => format!("{{{}}}", dsl),
                })
                .collect()
        });
        Ok(Self {
            source,
            segments: parsed,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[TemplateSegment] {
        &self.segments
    }

    /// True when rendering needs a scope
    pub fn has_expressions(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, TemplateSegment::Expression { .. }))
    }

    /// Evaluate every expression segment against `scope`.
    ///
    /// `format` receives the variable name when the segment is a bare
    /// reference, so name-based redaction still applies. A failing segment
    /// renders as [`EVALUATION_ERROR_TEXT`] and is reported in `errors`;
    /// the rest of the message is still produced.
    pub fn render(
        &self,
        scope: &dyn EvaluationScope,
        format: &dyn Fn(Option<&str>, &Value) -> String,
    ) -> RenderedMessage {
        let mut rendered = RenderedMessage::default();
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => rendered.text.push_str(text),
                TemplateSegment::Expression { dsl, expr } => match expr.evaluate(scope) {
                    Ok(value) => {
                        let name = match expr {
                            Expr::Ref(name) => Some(name.as_str()),
                            _ => None,
                        };
                        rendered.text.push_str(&format(name, &value));
                    }
                    Err(e) => {
                        rendered.text.push_str(EVALUATION_ERROR_TEXT);
                        rendered.errors.push(EvaluationErrorInfo {
                            expr: dsl.clone(),
                            message: e.to_string(),
                        });
                    }
                },
            }
        }
        rendered
    }
}

impl PartialEq for MessageTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.same_as(b))
    }
}

fn is_reference(text: &str) -> bool {
    let name = text.strip_prefix('@').unwrap_or(text);
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{VariableScope, REF_RETURN};
    use serde_json::json;

    fn plain(_name: Option<&str>, value: &Value) -> String {
        value
            .primitive_text()
            .unwrap_or_else(|| value.type_name().into_owned())
    }

    #[test]
    fn test_parse_splits_placeholders() {
        let t = MessageTemplate::parse("charged {@return} for {user}");
        assert_eq!(t.source(), "charged {@return} for {user}");
        assert_eq!(t.segments().len(), 4);
        assert!(t.has_expressions());

        let scope = VariableScope::new()
            .with(REF_RETURN, Value::Integer(5))
            .with("user", Value::String("ana".into()));
        let rendered = t.render(&scope, &plain);
        assert_eq!(rendered.text, "charged 5 for ana");
        assert!(rendered.errors.is_empty());
    }

    #[test]
    fn test_format_sees_reference_name() {
        let t = MessageTemplate::parse("token={token}");
        let scope = VariableScope::new().with("token", Value::String("abc".into()));
        let hide = |name: Option<&str>, value: &Value| match name {
            Some("token") => "[redacted]".to_string(),
            _ => plain(name, value),
        };
        assert_eq!(t.render(&scope, &hide).text, "token=[redacted]");
    }

    #[test]
    fn test_parse_keeps_non_identifier_braces() {
        let t = MessageTemplate::parse("{} and {a b} and {open");
        assert!(!t.has_expressions());
        let rendered = t.render(&VariableScope::new(), &plain);
        assert_eq!(rendered.text, "{} and {a b} and {open");
    }

    #[test]
    fn test_failing_segment_is_reported() {
        let t = MessageTemplate::parse("total {@return}, user {missing}");
        let scope = VariableScope::new().with(REF_RETURN, Value::Integer(3));
        let rendered = t.render(&scope, &plain);

        assert_eq!(rendered.text, "total 3, user [evaluation error]");
        assert_eq!(
            rendered.errors,
            vec![EvaluationErrorInfo {
                expr: "missing".to_string(),
                message: "Cannot find symbol missing".to_string(),
            }]
        );
    }

    #[test]
    fn test_from_segments() {
        let t = MessageTemplate::from_segments(
            None,
            &[
                json!({"str": "amount="}),
                json!({"dsl": "amount", "json": {"ref": "amount"}}),
            ],
        )
        .unwrap();
        assert_eq!(t.source(), "amount={amount}");

        let scope = VariableScope::new().with("amount", Value::Integer(150));
        assert_eq!(t.render(&scope, &plain).text, "amount=150");
    }

    #[test]
    fn test_from_segments_rejects_malformed_entries() {
        let err = MessageTemplate::from_segments(None, &[json!({"dsl": "x"})]).unwrap_err();
        assert!(err.to_string().contains("invalid template segment"));
    }

    #[test]
    fn test_equality_by_source_and_segments() {
        assert_eq!(MessageTemplate::parse("a {b}"), MessageTemplate::parse("a {b}"));
        assert_ne!(MessageTemplate::parse("a {b}"), MessageTemplate::parse("a {c}"));
    }
}
