//! Probe conditions
//!
//! A condition is a small predicate tree delivered in JSON form alongside
//! its source text, e.g. `{"gt": [{"ref": "amount"}, 100]}` for
//! `amount > 100`. Only read-only operations are supported: references,
//! member/index access, comparisons, boolean connectives, string tests and
//! collection predicates. There is no assignment and no function calls.

use crate::entities::{Value, TYPE_NIL};
use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value as Json;
use std::cmp::Ordering;
use thiserror::Error;

/// Reference bound to the current element inside `any`/`all`/`filter`
pub const REF_IT: &str = "@it";
/// Key of the current hash entry inside collection predicates
pub const REF_KEY: &str = "@key";
/// Value of the current hash entry inside collection predicates
pub const REF_VALUE: &str = "@value";
/// Return value of a method probe
pub const REF_RETURN: &str = "@return";
/// Duration of a method call in milliseconds
pub const REF_DURATION: &str = "@duration";
/// Exception raised by a method call
pub const REF_EXCEPTION: &str = "@exception";

/// Failure while evaluating a condition against live values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("Cannot find symbol {0}")]
    UndefinedReference(String),

    #[error("{0}")]
    InvalidOperand(String),

    #[error("Failed to read {type_name}: {message}")]
    Reflection { type_name: String, message: String },
}

/// Source of variable values for condition evaluation
pub trait EvaluationScope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// Flat name -> value scope
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    vars: Vec<(String, Value)>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.push((name.into(), value.into()));
    }
}

impl EvaluationScope for VariableScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        // Later bindings shadow earlier ones
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

/// Scope layering collection-predicate bindings over a parent scope
struct ElementScope<'a> {
    parent: &'a dyn EvaluationScope,
    it: Value,
    key: Option<Value>,
}

impl EvaluationScope for ElementScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            REF_IT => Some(self.it.clone()),
            REF_VALUE if self.key.is_some() => Some(self.it.clone()),
            REF_KEY => self.key.clone(),
            _ => self.parent.lookup(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    StartsWith,
    EndsWith,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOp {
    Any,
    All,
    Filter,
}

/// Parsed condition tree
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Ref(String),
    GetMember(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Len(Box<Expr>),
    IsEmpty(Box<Expr>),
    IsUndefined(Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Str(StringOp, Box<Expr>, Box<Expr>),
    Matches(Box<Expr>, Regex),
    InstanceOf(Box<Expr>, String),
    Substring(Box<Expr>, Box<Expr>, Box<Expr>),
    Collection(CollectionOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse the JSON form of an expression
    pub fn from_json(json: &Json) -> Result<Expr> {
        match json {
            Json::Null => Ok(Expr::Literal(Value::Nil)),
            Json::Bool(b) => Ok(Expr::Literal(Value::Bool(*b))),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Expr::Literal(Value::Integer(i as i128))),
                None => n
                    .as_f64()
                    .map(|f| Expr::Literal(Value::Float(f)))
                    .ok_or_else(|| invalid(format!("unsupported number literal {}", n))),
            },
            Json::String(s) => Ok(Expr::Literal(Value::String(s.clone()))),
            Json::Array(_) => Err(invalid("array literals are not supported")),
            Json::Object(map) => {
                if map.len() != 1 {
                    return Err(invalid(format!(
                        "expression node must have exactly one operator, got {}",
                        map.len()
                    )));
                }
                let Some((op, arg)) = map.iter().next() else {
                    return Err(invalid("empty expression node"));
                };
                Self::from_operator(op, arg)
            }
        }
    }

    fn from_operator(op: &str, arg: &Json) -> Result<Expr> {
        let unary = |arg: &Json| -> Result<Box<Expr>> { Ok(Box::new(Expr::from_json(arg)?)) };
        let binary = |arg: &Json| -> Result<(Box<Expr>, Box<Expr>)> {
            let [a, b] = operands::<2>(op, arg)?;
            Ok((Box::new(Expr::from_json(a)?), Box::new(Expr::from_json(b)?)))
        };

        match op {
            "ref" => match arg.as_str() {
                Some(name) => Ok(Expr::Ref(name.to_string())),
                None => Err(invalid("ref takes a variable name")),
            },
            "getmember" => {
                let [target, name] = operands::<2>(op, arg)?;
                let name = name
                    .as_str()
                    .ok_or_else(|| invalid("getmember takes a member name"))?;
                Ok(Expr::GetMember(
                    Box::new(Expr::from_json(target)?),
                    name.to_string(),
                ))
            }
            "index" => {
                let (a, b) = binary(arg)?;
                Ok(Expr::Index(a, b))
            }
            "len" | "count" => Ok(Expr::Len(unary(arg)?)),
            "isEmpty" => Ok(Expr::IsEmpty(unary(arg)?)),
            "isUndefined" => Ok(Expr::IsUndefined(unary(arg)?)),
            "not" => Ok(Expr::Not(unary(arg)?)),
            "and" | "or" => {
                let items = arg
                    .as_array()
                    .ok_or_else(|| invalid(format!("{} takes a list of operands", op)))?;
                let exprs = items.iter().map(Expr::from_json).collect::<Result<Vec<_>>>()?;
                if op == "and" {
                    Ok(Expr::And(exprs))
                } else {
                    Ok(Expr::Or(exprs))
                }
            }
            "eq" | "ne" | "gt" | "ge" | "lt" | "le" => {
                let cmp = match op {
                    "eq" => CompareOp::Eq,
                    "ne" => CompareOp::Ne,
                    "gt" => CompareOp::Gt,
                    "ge" => CompareOp::Ge,
                    "lt" => CompareOp::Lt,
                    _ => CompareOp::Le,
                };
                let (a, b) = binary(arg)?;
                Ok(Expr::Compare(cmp, a, b))
            }
            "startsWith" | "endsWith" | "contains" => {
                let sop = match op {
                    "startsWith" => StringOp::StartsWith,
                    "endsWith" => StringOp::EndsWith,
                    _ => StringOp::Contains,
                };
                let (a, b) = binary(arg)?;
                Ok(Expr::Str(sop, a, b))
            }
            "matches" => {
                let [target, pattern] = operands::<2>(op, arg)?;
                let pattern = pattern
                    .as_str()
                    .ok_or_else(|| invalid("matches takes a literal pattern"))?;
                let regex = Regex::new(pattern)
                    .map_err(|e| invalid(format!("invalid pattern {}: {}", pattern, e)))?;
                Ok(Expr::Matches(Box::new(Expr::from_json(target)?), regex))
            }
            "instanceof" => {
                let [target, type_name] = operands::<2>(op, arg)?;
                let type_name = type_name
                    .as_str()
                    .ok_or_else(|| invalid("instanceof takes a type name"))?;
                Ok(Expr::InstanceOf(
                    Box::new(Expr::from_json(target)?),
                    type_name.to_string(),
                ))
            }
            "substring" => {
                let [s, from, to] = operands::<3>(op, arg)?;
                Ok(Expr::Substring(
                    Box::new(Expr::from_json(s)?),
                    Box::new(Expr::from_json(from)?),
                    Box::new(Expr::from_json(to)?),
                ))
            }
            "any" | "all" | "filter" => {
                let cop = match op {
                    "any" => CollectionOp::Any,
                    "all" => CollectionOp::All,
                    _ => CollectionOp::Filter,
                };
                let (a, b) = binary(arg)?;
                Ok(Expr::Collection(cop, a, b))
            }
            other => Err(invalid(format!("unknown operator {}", other))),
        }
    }

    /// Evaluate against a scope
    pub fn evaluate(&self, scope: &dyn EvaluationScope) -> std::result::Result<Value, EvaluationError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ref(name) => scope
                .lookup(name)
                .ok_or_else(|| EvaluationError::UndefinedReference(name.clone())),
            Expr::GetMember(target, name) => get_member(&target.evaluate(scope)?, name),
            Expr::Index(target, index) => {
                index_value(&target.evaluate(scope)?, &index.evaluate(scope)?)
            }
            Expr::Len(target) => Ok(Value::from(length(&target.evaluate(scope)?)?)),
            Expr::IsEmpty(target) => Ok(Value::Bool(length(&target.evaluate(scope)?)? == 0)),
            Expr::IsUndefined(target) => match target.evaluate(scope) {
                Ok(_) => Ok(Value::Bool(false)),
                Err(EvaluationError::UndefinedReference(_)) => Ok(Value::Bool(true)),
                Err(e) => Err(e),
            },
            Expr::Compare(op, a, b) => {
                compare(*op, &a.evaluate(scope)?, &b.evaluate(scope)?).map(Value::Bool)
            }
            Expr::And(items) => {
                for item in items {
                    if !item.evaluate(scope)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(items) => {
                for item in items {
                    if item.evaluate(scope)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Not(inner) => Ok(Value::Bool(!inner.evaluate(scope)?.is_truthy())),
            Expr::Str(op, a, b) => {
                let a = a.evaluate(scope)?;
                let b = b.evaluate(scope)?;
                string_op(*op, &a, &b).map(Value::Bool)
            }
            Expr::Matches(target, regex) => {
                let value = target.evaluate(scope)?;
                let text = expect_str(&value, "matches")?;
                Ok(Value::Bool(regex.is_match(text)))
            }
            Expr::InstanceOf(target, type_name) => {
                let value = target.evaluate(scope)?;
                let matches = value.type_name() == type_name.as_str()
                    || (type_name == TYPE_NIL && value.is_nil());
                Ok(Value::Bool(matches))
            }
            Expr::Substring(s, from, to) => {
                let s = s.evaluate(scope)?;
                let text = expect_str(&s, "substring")?;
                let from = expect_index(&from.evaluate(scope)?)?;
                let to = expect_index(&to.evaluate(scope)?)?;
                let chars: Vec<char> = text.chars().collect();
                if from > to || to > chars.len() {
                    return Err(EvaluationError::InvalidOperand(format!(
                        "substring range {}..{} out of bounds for length {}",
                        from,
                        to,
                        chars.len()
                    )));
                }
                Ok(Value::String(chars[from..to].iter().collect()))
            }
            Expr::Collection(op, target, predicate) => {
                collection_op(*op, &target.evaluate(scope)?, predicate, scope)
            }
        }
    }
}

/// A probe condition: source text plus its parsed tree
#[derive(Debug, Clone)]
pub struct Condition {
    dsl: String,
    json: Json,
    expr: Expr,
}

impl Condition {
    /// Parse from the source text and JSON tree
    pub fn parse(dsl: impl Into<String>, json: Json) -> Result<Self> {
        let expr = Expr::from_json(&json)?;
        Ok(Self {
            dsl: dsl.into(),
            json,
            expr,
        })
    }

    /// Source text of the condition, as written by the user
    pub fn dsl(&self) -> &str {
        &self.dsl
    }

    pub fn json(&self) -> &Json {
        &self.json
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate to a boolean using truthiness of the result
    pub fn evaluate(&self, scope: &dyn EvaluationScope) -> std::result::Result<bool, EvaluationError> {
        Ok(self.expr.evaluate(scope)?.is_truthy())
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.dsl == other.dsl && self.json == other.json
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidCondition(message.into())
}

fn operands<'a, const N: usize>(op: &str, arg: &'a Json) -> Result<[&'a Json; N]> {
    let items: Vec<&Json> = arg
        .as_array()
        .map(|items| items.iter().collect())
        .unwrap_or_default();
    items
        .try_into()
        .map_err(|_| invalid(format!("{} takes {} operands", op, N)))
}

fn expect_str<'a>(value: &'a Value, op: &str) -> std::result::Result<&'a str, EvaluationError> {
    value.as_str().ok_or_else(|| {
        EvaluationError::InvalidOperand(format!(
            "{} expects a string, got {}",
            op,
            value.type_name()
        ))
    })
}

fn expect_index(value: &Value) -> std::result::Result<usize, EvaluationError> {
    match value {
        Value::Integer(i) if *i >= 0 => usize::try_from(*i)
            .map_err(|_| EvaluationError::InvalidOperand(format!("index {} too large", i))),
        other => Err(EvaluationError::InvalidOperand(format!(
            "expected a non-negative integer, got {}",
            other.type_name()
        ))),
    }
}

fn length(value: &Value) -> std::result::Result<usize, EvaluationError> {
    match value {
        Value::String(s) | Value::Symbol(s) => Ok(s.chars().count()),
        Value::Array(items) => Ok(items.len()),
        Value::Hash(entries) => Ok(entries.len()),
        other => Err(EvaluationError::InvalidOperand(format!(
            "Cannot get length of {}",
            other.type_name()
        ))),
    }
}

fn get_member(value: &Value, name: &str) -> std::result::Result<Value, EvaluationError> {
    match value {
        Value::Object(obj) => {
            let type_name = value.type_name().into_owned();
            let fields = obj.fields().map_err(|e| EvaluationError::Reflection {
                type_name: type_name.clone(),
                message: e.to_string(),
            })?;
            let sigiled = format!("@{}", name);
            fields
                .into_iter()
                .find(|(field, _)| field == name || *field == sigiled)
                .map(|(_, v)| v)
                .ok_or_else(|| {
                    EvaluationError::InvalidOperand(format!(
                        "{} has no member {}",
                        type_name, name
                    ))
                })
        }
        Value::Hash(entries) => Ok(entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Nil)),
        other => Err(EvaluationError::InvalidOperand(format!(
            "Cannot read member {} of {}",
            name,
            other.type_name()
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> std::result::Result<Value, EvaluationError> {
    match target {
        Value::Array(items) => {
            let i = expect_index(index)?;
            Ok(items.get(i).cloned().unwrap_or(Value::Nil))
        }
        Value::Hash(entries) => Ok(entries
            .iter()
            .find(|(k, _)| k == index)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Nil)),
        other => Err(EvaluationError::InvalidOperand(format!(
            "Cannot index into {}",
            other.type_name()
        ))),
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> std::result::Result<bool, EvaluationError> {
    let ordering = || {
        let ordering = match (a, b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            (Value::Time(x), Value::Time(y)) => Some(x.cmp(y)),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        };
        ordering.ok_or_else(|| {
            EvaluationError::InvalidOperand(format!(
                "Cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            ))
        })
    };

    Ok(match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Gt => ordering()? == Ordering::Greater,
        CompareOp::Ge => ordering()? != Ordering::Less,
        CompareOp::Lt => ordering()? == Ordering::Less,
        CompareOp::Le => ordering()? != Ordering::Greater,
    })
}

fn string_op(op: StringOp, a: &Value, b: &Value) -> std::result::Result<bool, EvaluationError> {
    if op == StringOp::Contains {
        match a {
            Value::Array(items) => return Ok(items.iter().any(|item| item == b)),
            Value::Hash(entries) => return Ok(entries.iter().any(|(k, _)| k == b)),
            _ => {}
        }
    }
    let name = match op {
        StringOp::StartsWith => "startsWith",
        StringOp::EndsWith => "endsWith",
        StringOp::Contains => "contains",
    };
    let haystack = expect_str(a, name)?;
    let needle = expect_str(b, name)?;
    Ok(match op {
        StringOp::StartsWith => haystack.starts_with(needle),
        StringOp::EndsWith => haystack.ends_with(needle),
        StringOp::Contains => haystack.contains(needle),
    })
}

fn collection_op(
    op: CollectionOp,
    target: &Value,
    predicate: &Expr,
    scope: &dyn EvaluationScope,
) -> std::result::Result<Value, EvaluationError> {
    let elements: Vec<(Option<Value>, Value)> = match target {
        Value::Array(items) => items.iter().map(|v| (None, v.clone())).collect(),
        Value::Hash(entries) => entries
            .iter()
            .map(|(k, v)| (Some(k.clone()), v.clone()))
            .collect(),
        other => {
            return Err(EvaluationError::InvalidOperand(format!(
                "Cannot iterate over {}",
                other.type_name()
            )))
        }
    };

    let mut kept = Vec::new();
    for (key, it) in elements {
        let element_scope = ElementScope {
            parent: scope,
            it: it.clone(),
            key: key.clone(),
        };
        let matched = predicate.evaluate(&element_scope)?.is_truthy();
        match op {
            CollectionOp::Any if matched => return Ok(Value::Bool(true)),
            CollectionOp::All if !matched => return Ok(Value::Bool(false)),
            CollectionOp::Filter if matched => kept.push((key, it)),
            _ => {}
        }
    }

    Ok(match op {
        CollectionOp::Any => Value::Bool(false),
        CollectionOp::All => Value::Bool(true),
        CollectionOp::Filter => match target {
            Value::Hash(_) => Value::Hash(
                kept.into_iter()
                    .map(|(k, v)| (k.unwrap_or(Value::Nil), v))
                    .collect(),
            ),
            _ => Value::Array(kept.into_iter().map(|(_, v)| v).collect()),
        },
    })
}
