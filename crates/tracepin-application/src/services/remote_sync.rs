//! Remote probe snapshot reconciliation
//!
//! Remote configuration delivers the full set of desired probes on every
//! sync. [`ProbeSnapshotSync::apply`] diffs that set against what the
//! manager already knows:
//!
//! - new id: RECEIVED, then `add_probe`
//! - same id, changed definition: RECEIVED, remove, then `add_probe`
//! - same id, same definition: left alone
//! - known id missing from the snapshot: removed
//!
//! A failure on one probe becomes an ERROR status for that probe and never
//! stops the rest of the batch.

use crate::services::probe_manager::ProbeManager;
use serde::Deserialize;
use serde_json::Value as Json;
use std::sync::Arc;
use tracepin_core::{
    CaptureOverrides, Condition, Error, MessageTemplate, Probe, ProbeType, Result,
};
use tracepin_ports::ProbeStatusSinkRef;
use tracing::{debug, info, warn};

/// Values used where a remote definition leaves a field out
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeDefaults {
    pub probe_type: ProbeType,
    pub capture_snapshot: bool,
}

impl Default for ProbeDefaults {
    fn default() -> Self {
        Self {
            probe_type: ProbeType::Log,
            capture_snapshot: false,
        }
    }
}

// ============================================================================
// Remote definition format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteProbe {
    id: String,
    #[serde(default)]
    version: u64,
    #[serde(rename = "type")]
    probe_type: Option<String>,
    #[serde(rename = "where")]
    location: RemoteWhere,
    capture_snapshot: Option<bool>,
    capture: Option<RemoteCapture>,
    sampling: Option<RemoteSampling>,
    when: Option<RemoteWhen>,
    template: Option<String>,
    segments: Option<Vec<Json>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteWhere {
    type_name: Option<String>,
    method_name: Option<String>,
    source_file: Option<String>,
    #[serde(default)]
    lines: Vec<Json>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteCapture {
    max_reference_depth: Option<usize>,
    max_field_count: Option<usize>,
    max_collection_size: Option<usize>,
    max_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSampling {
    snapshots_per_second: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RemoteWhen {
    dsl: String,
    json: Json,
}

/// Line numbers arrive as strings (`"12"`) or plain numbers
fn parse_line(id: &str, line: &Json) -> Result<u32> {
    let parsed = match line {
        Json::String(s) => s.trim().parse::<u32>().ok(),
        Json::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    };
    parsed.ok_or_else(|| Error::InvalidProbe(format!("probe {}: invalid line number {}", id, line)))
}

/// Build a probe from its remote JSON definition
pub fn parse_probe_definition(json: &Json, defaults: &ProbeDefaults) -> Result<Probe> {
    let remote: RemoteProbe = serde_json::from_value(json.clone())
        .map_err(|e| Error::InvalidProbe(format!("malformed probe definition: {}", e)))?;

    let probe_type = match &remote.probe_type {
        Some(name) => name.parse::<ProbeType>()?,
        None => defaults.probe_type,
    };

    let mut builder = Probe::builder(remote.id.clone(), probe_type)
        .version(remote.version)
        .capture_snapshot(remote.capture_snapshot.unwrap_or(defaults.capture_snapshot));

    let location = remote.location;
    if let Some(type_name) = location.type_name {
        builder = builder.type_name(type_name);
    }
    if let Some(method_name) = location.method_name {
        builder = builder.method_name(method_name);
    }
    if let Some(file) = location.source_file {
        builder = builder.file(file);
    }
    if let Some(line) = location.lines.first() {
        builder = builder.line_no(parse_line(&remote.id, line)?);
    }

    if let Some(capture) = remote.capture {
        builder = builder.capture_overrides(CaptureOverrides {
            max_depth: capture.max_reference_depth,
            max_attribute_count: capture.max_field_count,
            max_collection_size: capture.max_collection_size,
            max_string_length: capture.max_length,
        });
    }
    if let Some(rate) = remote.sampling.and_then(|s| s.snapshots_per_second) {
        builder = builder.rate_limit(rate);
    }
    if let Some(when) = remote.when {
        builder = builder.condition(Condition::parse(when.dsl, when.json)?);
    }
    // Segments are authoritative, the template string is only display text then
    match (remote.template, remote.segments) {
        (template, Some(segments)) => {
            let template = MessageTemplate::from_segments(template, &segments)?;
            builder = builder.message_template(template);
        }
        (Some(template), None) => builder = builder.template(template),
        (None, None) => {}
    }

    builder.build()
}

// ============================================================================
// Reconciliation
// ============================================================================

/// What one sync did, ids sorted within each list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub installed: Vec<String>,
    pub pending: Vec<String>,
    pub unchanged: Vec<String>,
    /// Probes whose installation or replacement failed, with the error
    pub failed: Vec<(String, String)>,
    /// Definitions that could not be parsed
    pub invalid: Vec<String>,
    pub removed: Vec<String>,
}

impl SyncReport {
    fn sort(&mut self) {
        self.installed.sort();
        self.pending.sort();
        self.unchanged.sort();
        self.failed.sort();
        self.invalid.sort();
        self.removed.sort();
    }
}

pub struct ProbeSnapshotSync {
    manager: Arc<ProbeManager>,
    status_sink: ProbeStatusSinkRef,
    defaults: ProbeDefaults,
}

impl ProbeSnapshotSync {
    pub fn new(
        manager: Arc<ProbeManager>,
        status_sink: ProbeStatusSinkRef,
        defaults: ProbeDefaults,
    ) -> Self {
        Self {
            manager,
            status_sink,
            defaults,
        }
    }

    /// Reconcile the manager with the full desired probe set
    pub fn apply(&self, desired: &[Json]) -> SyncReport {
        let mut report = SyncReport::default();
        let mut keep: Vec<String> = Vec::with_capacity(desired.len());

        for definition in desired {
            // An unparseable update must not tear down the running probe
            if let Some(id) = definition.get("id").and_then(Json::as_str) {
                keep.push(id.to_string());
            }

            let probe = match parse_probe_definition(definition, &self.defaults) {
                Ok(probe) => Arc::new(probe),
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid probe definition");
                    report.invalid.push(e.to_string());
                    continue;
                }
            };
            self.apply_one(probe, &mut report);
        }

        report.removed = self.manager.remove_other_probes(&keep);
        report.sort();
        info!(
            installed = report.installed.len(),
            pending = report.pending.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            removed = report.removed.len(),
            "Probe snapshot applied"
        );
        report
    }

    fn apply_one(&self, probe: Arc<Probe>, report: &mut SyncReport) {
        let id = probe.id().to_string();

        if let Some(existing) = self.manager.probe(&id) {
            if existing.same_definition(&probe) {
                report.unchanged.push(id);
                return;
            }
            debug!(probe_id = %id, "Probe definition changed, replacing");
            self.status_sink.probe_received(&probe);
            if let Err(e) = self.manager.remove_probe(&id) {
                self.fail(&probe, e, report);
                return;
            }
        } else {
            self.status_sink.probe_received(&probe);
        }

        match self.manager.add_probe(Arc::clone(&probe)) {
            Ok(true) => report.installed.push(id),
            Ok(false) => report.pending.push(id),
            Err(e) => self.fail(&probe, e, report),
        }
    }

    fn fail(&self, probe: &Probe, error: Error, report: &mut SyncReport) {
        self.status_sink.probe_errored(probe, &error);
        report.failed.push((probe.id().to_string(), error.to_string()));
    }
}
