//! Probe entity - one declarative instrumentation point

use crate::condition::Condition;
use crate::entities::capture::CaptureOverrides;
use crate::entities::location::{path_matches_suffix, ProbeLocation};
use crate::error::{Error, Result};
use crate::template::MessageTemplate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

pub const PROBE_TYPE_LOG: &str = "log";
pub const PROBE_TYPE_METRIC: &str = "metric";
pub const PROBE_TYPE_SPAN: &str = "span";

/// Kind of probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeType {
    Log,
    Metric,
    Span,
}

impl ProbeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeType::Log => PROBE_TYPE_LOG,
            ProbeType::Metric => PROBE_TYPE_METRIC,
            ProbeType::Span => PROBE_TYPE_SPAN,
        }
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `log`/`metric`/`span` and the remote spellings `LOG_PROBE` etc.
impl FromStr for ProbeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "log" | "log_probe" => Ok(ProbeType::Log),
            "metric" | "metric_probe" => Ok(ProbeType::Metric),
            "span" | "span_probe" => Ok(ProbeType::Span),
            _ => Err(Error::UnknownProbeType(s.to_string())),
        }
    }
}

/// One instrumentation point.
///
/// Everything except `enabled` is fixed at construction. `enabled` is
/// flipped off by the circuit breaker and never turned back on.
#[derive(Debug)]
pub struct Probe {
    id: String,
    version: u64,
    probe_type: ProbeType,
    location: ProbeLocation,
    capture_snapshot: bool,
    condition: Option<Condition>,
    rate_limit: Option<f64>,
    capture_overrides: CaptureOverrides,
    template: Option<MessageTemplate>,
    enabled: AtomicBool,
}

impl Probe {
    /// Start building a probe
    pub fn builder(id: impl Into<String>, probe_type: ProbeType) -> ProbeBuilder {
        ProbeBuilder::new(id, probe_type)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn probe_type(&self) -> ProbeType {
        self.probe_type
    }

    pub fn location(&self) -> &ProbeLocation {
        &self.location
    }

    /// `Type.method` or `file:line`
    pub fn location_label(&self) -> String {
        self.location.to_string()
    }

    pub fn is_line(&self) -> bool {
        self.location.is_line()
    }

    pub fn is_method(&self) -> bool {
        self.location.is_method()
    }

    /// Line number of a line probe
    pub fn line_no(&self) -> Result<u32> {
        match &self.location {
            ProbeLocation::Line { line_no, .. } => Ok(*line_no),
            ProbeLocation::Method { .. } => Err(Error::MissingLineNumber(self.id.clone())),
        }
    }

    pub fn file(&self) -> Option<&str> {
        match &self.location {
            ProbeLocation::Line { file, .. } => Some(file),
            ProbeLocation::Method { .. } => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match &self.location {
            ProbeLocation::Method { type_name, .. } => Some(type_name),
            ProbeLocation::Line { .. } => None,
        }
    }

    pub fn method_name(&self) -> Option<&str> {
        match &self.location {
            ProbeLocation::Method { method_name, .. } => Some(method_name),
            ProbeLocation::Line { .. } => None,
        }
    }

    /// Whether `path` is the file this line probe targets
    pub fn file_matches(&self, path: &str) -> bool {
        self.file()
            .map(|file| path_matches_suffix(path, file))
            .unwrap_or(false)
    }

    pub fn capture_snapshot(&self) -> bool {
        self.capture_snapshot
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Explicit sampling rate in firings per second, if the definition set one
    pub fn rate_limit(&self) -> Option<f64> {
        self.rate_limit
    }

    pub fn capture_overrides(&self) -> &CaptureOverrides {
        &self.capture_overrides
    }

    pub fn template(&self) -> Option<&MessageTemplate> {
        self.template.as_ref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turn the probe off. Returns true if this call did the transition.
    pub fn disable(&self) -> bool {
        self.enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True when every definitional field matches (ids included, state ignored)
    pub fn same_definition(&self, other: &Probe) -> bool {
        self.id == other.id
            && self.version == other.version
            && self.probe_type == other.probe_type
            && self.location == other.location
            && self.capture_snapshot == other.capture_snapshot
            && self.condition == other.condition
            && self.rate_limit == other.rate_limit
            && self.capture_overrides == other.capture_overrides
            && self.template == other.template
    }
}

impl Clone for Probe {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            version: self.version,
            probe_type: self.probe_type,
            location: self.location.clone(),
            capture_snapshot: self.capture_snapshot,
            condition: self.condition.clone(),
            rate_limit: self.rate_limit,
            capture_overrides: self.capture_overrides,
            template: self.template.clone(),
            enabled: AtomicBool::new(self.enabled()),
        }
    }
}

/// Identity is by id
impl PartialEq for Probe {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Probe {}

// ============================================================================
// ProbeBuilder
// ============================================================================

/// Builder validating location exclusivity at `build()`
#[derive(Debug, Clone)]
pub struct ProbeBuilder {
    id: String,
    probe_type: ProbeType,
    version: u64,
    type_name: Option<String>,
    method_name: Option<String>,
    file: Option<String>,
    line_no: Option<u32>,
    capture_snapshot: bool,
    condition: Option<Condition>,
    rate_limit: Option<f64>,
    capture_overrides: CaptureOverrides,
    template: Option<MessageTemplate>,
}

impl ProbeBuilder {
    pub fn new(id: impl Into<String>, probe_type: ProbeType) -> Self {
        Self {
            id: id.into(),
            probe_type,
            version: 0,
            type_name: None,
            method_name: None,
            file: None,
            line_no: None,
            capture_snapshot: false,
            condition: None,
            rate_limit: None,
            capture_overrides: CaptureOverrides::default(),
            template: None,
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Target a method on a type
    pub fn method(mut self, type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self.method_name = Some(method_name.into());
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn method_name(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = Some(method_name.into());
        self
    }

    /// Target a line in a source file
    pub fn line(mut self, file: impl Into<String>, line_no: u32) -> Self {
        self.file = Some(file.into());
        self.line_no = Some(line_no);
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn line_no(mut self, line_no: u32) -> Self {
        self.line_no = Some(line_no);
        self
    }

    pub fn capture_snapshot(mut self, capture: bool) -> Self {
        self.capture_snapshot = capture;
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn rate_limit(mut self, per_second: f64) -> Self {
        self.rate_limit = Some(per_second);
        self
    }

    pub fn capture_overrides(mut self, overrides: CaptureOverrides) -> Self {
        self.capture_overrides = overrides;
        self
    }

    /// Template text with optional `{name}` placeholders
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(MessageTemplate::parse(template));
        self
    }

    pub fn message_template(mut self, template: MessageTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn build(self) -> Result<Probe> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidProbe("probe id cannot be empty".to_string()));
        }
        if let Some(rate) = self.rate_limit {
            if rate.is_nan() || rate < 0.0 {
                return Err(Error::InvalidProbe(format!(
                    "probe {}: rate limit must be non-negative, got {}",
                    self.id, rate
                )));
            }
        }

        let has_method_part = self.type_name.is_some() || self.method_name.is_some();
        let has_line_part = self.file.is_some() || self.line_no.is_some();

        let location = match (has_method_part, has_line_part) {
            (true, true) => {
                return Err(Error::InvalidProbe(format!(
                    "probe {} has both method and line locations",
                    self.id
                )))
            }
            (false, false) => {
                return Err(Error::InvalidProbe(format!(
                    "probe {} has neither a method nor a line location",
                    self.id
                )))
            }
            (true, false) => match (self.type_name, self.method_name) {
                (Some(type_name), Some(method_name)) => ProbeLocation::Method {
                    type_name,
                    method_name,
                },
                _ => {
                    return Err(Error::InvalidProbe(format!(
                        "probe {}: method location needs both type and method names",
                        self.id
                    )))
                }
            },
            (false, true) => match (self.file, self.line_no) {
                (Some(file), Some(line_no)) if !file.is_empty() => {
                    ProbeLocation::Line { file, line_no }
                }
                _ => {
                    return Err(Error::InvalidProbe(format!(
                        "probe {}: line location needs both file and line number",
                        self.id
                    )))
                }
            },
        };

        Ok(Probe {
            id: self.id,
            version: self.version,
            probe_type: self.probe_type,
            location,
            capture_snapshot: self.capture_snapshot,
            condition: self.condition,
            rate_limit: self.rate_limit,
            capture_overrides: self.capture_overrides,
            template: self.template,
            enabled: AtomicBool::new(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_probe() -> Probe {
        Probe::builder("p1", ProbeType::Log)
            .method("Billing::Invoice", "total")
            .build()
            .unwrap()
    }

    #[test]
    fn test_method_probe() {
        let probe = method_probe();
        assert!(probe.is_method());
        assert!(!probe.is_line());
        assert_eq!(probe.location_label(), "Billing::Invoice.total");
        assert_eq!(probe.type_name(), Some("Billing::Invoice"));
        assert!(probe.enabled());
    }

    #[test]
    fn test_line_probe() {
        let probe = Probe::builder("p2", ProbeType::Log)
            .line("app/models/invoice.rs", 12)
            .build()
            .unwrap();
        assert!(probe.is_line());
        assert_eq!(probe.line_no().unwrap(), 12);
        assert_eq!(probe.location_label(), "app/models/invoice.rs:12");
        assert!(probe.file_matches("/srv/app/models/invoice.rs"));
        assert!(!probe.file_matches("/srv/app/models/xinvoice.rs"));
    }

    #[test]
    fn test_line_no_on_method_probe_fails() {
        let err = method_probe().line_no().unwrap_err();
        assert_eq!(err, Error::MissingLineNumber("p1".to_string()));
    }

    #[test]
    fn test_both_locations_rejected() {
        let err = Probe::builder("p", ProbeType::Log)
            .method("A", "b")
            .line("a.rs", 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProbe(_)));
    }

    #[test]
    fn test_no_location_rejected() {
        let err = Probe::builder("p", ProbeType::Log).build().unwrap_err();
        assert!(matches!(err, Error::InvalidProbe(_)));
    }

    #[test]
    fn test_partial_locations_rejected() {
        assert!(Probe::builder("p", ProbeType::Log).type_name("A").build().is_err());
        assert!(Probe::builder("p", ProbeType::Log).line_no(3).build().is_err());
        assert!(Probe::builder("", ProbeType::Log).method("A", "b").build().is_err());
    }

    #[test]
    fn test_negative_rate_limit_rejected() {
        let err = Probe::builder("p", ProbeType::Log)
            .method("A", "b")
            .rate_limit(-1.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProbe(_)));
    }

    #[test]
    fn test_disable_transitions_once() {
        let probe = method_probe();
        assert!(probe.disable());
        assert!(!probe.disable());
        assert!(!probe.enabled());
    }

    #[test]
    fn test_equality_by_id() {
        let a = method_probe();
        let b = Probe::builder("p1", ProbeType::Metric)
            .line("x.rs", 1)
            .build()
            .unwrap();
        assert_eq!(a, b);
        assert!(!a.same_definition(&b));
        assert!(a.same_definition(&a.clone()));
    }

    #[test]
    fn test_probe_type_parsing() {
        assert_eq!("LOG_PROBE".parse::<ProbeType>().unwrap(), ProbeType::Log);
        assert_eq!("metric".parse::<ProbeType>().unwrap(), ProbeType::Metric);
        assert_eq!("SPAN_PROBE".parse::<ProbeType>().unwrap(), ProbeType::Span);
        assert!(matches!(
            "SPAN_DECORATION_PROBE".parse::<ProbeType>(),
            Err(Error::UnknownProbeType(_))
        ));
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn proptest_exactly_one_location(
            type_name in proptest::option::of("[A-Z][a-z]{0,6}"),
            method_name in proptest::option::of("[a-z]{1,6}"),
            file in proptest::option::of("[a-z]{1,6}\\.rs"),
            line_no in proptest::option::of(1u32..1000),
        ) {
            let mut builder = Probe::builder("p", ProbeType::Log);
            if let Some(t) = &type_name { builder = builder.type_name(t.clone()); }
            if let Some(m) = &method_name { builder = builder.method_name(m.clone()); }
            if let Some(f) = &file { builder = builder.file(f.clone()); }
            if let Some(l) = line_no { builder = builder.line_no(l); }

            let method_complete = type_name.is_some() && method_name.is_some();
            let line_complete = file.is_some() && line_no.is_some();
            let method_any = type_name.is_some() || method_name.is_some();
            let line_any = file.is_some() || line_no.is_some();
            let valid = (method_complete && !line_any) || (line_complete && !method_any);

            match builder.build() {
                Ok(probe) => {
                    prop_assert!(valid);
                    prop_assert!(probe.is_method() != probe.is_line());
                }
                Err(_) => prop_assert!(!valid),
            }
        }
    }
}
