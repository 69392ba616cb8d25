//! Probe manager - lifecycle of every probe the agent knows about
//!
//! Each probe lives in at most one of three sets:
//!
//! - `pending`: target not resolvable yet, retried when code loads
//! - `installed`: hooked and firing
//! - `failed`: installation failed unexpectedly; keeps the definition and
//!   the error message
//!
//! Set membership is guarded by one lock, taken around instrumenter calls
//! so adds and removals of the same id never interleave. The closed flag
//! only flips under that lock, so no hook is installed once `close`
//! returns. Hooks themselves never touch the manager.

use crate::services::instrumenter::Instrumenter;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracepin_core::{Error, Probe, Result};
use tracepin_ports::{ProbeEventSinkRef, ProbeStatusSinkRef};
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct ProbeSets {
    pending: HashMap<String, Arc<Probe>>,
    installed: HashMap<String, Arc<Probe>>,
    /// Definition and error message of each failed probe
    failed: HashMap<String, (Arc<Probe>, String)>,
}

/// Outcome of one install attempt, reported after the lock is released
enum Attempt {
    Installed(Arc<Probe>),
    Pending,
    Failed(Arc<Probe>, Error),
}

pub struct ProbeManager {
    instrumenter: Arc<Instrumenter>,
    event_sink: ProbeEventSinkRef,
    status_sink: ProbeStatusSinkRef,
    sets: RwLock<ProbeSets>,
    closed: AtomicBool,
}

impl ProbeManager {
    pub fn new(
        instrumenter: Arc<Instrumenter>,
        event_sink: ProbeEventSinkRef,
        status_sink: ProbeStatusSinkRef,
    ) -> Self {
        Self {
            instrumenter,
            event_sink,
            status_sink,
            sets: RwLock::new(ProbeSets::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn read_sets(&self) -> RwLockReadGuard<'_, ProbeSets> {
        match self.sets.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Probe manager read lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_sets(&self) -> RwLockWriteGuard<'_, ProbeSets> {
        match self.sets.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Probe manager write lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn attempt(&self, sets: &mut ProbeSets, probe: Arc<Probe>) -> Attempt {
        let id = probe.id().to_string();
        match self
            .instrumenter
            .hook(Arc::clone(&probe), Arc::clone(&self.event_sink))
        {
            Ok(()) => {
                sets.pending.remove(&id);
                sets.installed.insert(id, Arc::clone(&probe));
                Attempt::Installed(probe)
            }
            Err(e) if e.is_target_not_defined() => {
                debug!(probe_id = %id, reason = %e, "Probe target not defined yet, pending");
                sets.pending.insert(id, probe);
                Attempt::Pending
            }
            Err(e) => {
                error!(
                    probe_id = %id,
                    location = %probe.location_label(),
                    error = %e,
                    "Probe installation failed"
                );
                sets.pending.remove(&id);
                sets.failed.insert(id, (Arc::clone(&probe), e.to_string()));
                Attempt::Failed(probe, e)
            }
        }
    }

    /// Install a probe.
    ///
    /// Returns `Ok(true)` once hooked and `Ok(false)` when the target is not
    /// defined yet (the probe waits in `pending`). Any other failure moves
    /// the probe to `failed` and is returned to the caller.
    pub fn add_probe(&self, probe: impl Into<Arc<Probe>>) -> Result<bool> {
        let probe = probe.into();
        let attempt = {
            let mut sets = self.write_sets();
            if self.is_closed() {
                return Err(Error::ProbeManagerClosed);
            }
            if sets.installed.contains_key(probe.id()) {
                return Err(Error::AlreadyInstrumented(probe.id().to_string()));
            }
            if let Some((_, message)) = sets.failed.get(probe.id()) {
                return Err(Error::ProbePreviouslyFailed {
                    id: probe.id().to_string(),
                    message: message.clone(),
                });
            }
            self.attempt(&mut sets, probe)
        };

        match attempt {
            Attempt::Installed(probe) => {
                info!(probe_id = %probe.id(), location = %probe.location_label(), "Probe installed");
                self.status_sink.probe_installed(&probe);
                Ok(true)
            }
            Attempt::Pending => Ok(false),
            Attempt::Failed(_, e) => Err(e),
        }
    }

    /// Remove one probe from whichever set holds it.
    ///
    /// An installed probe whose unhook fails stays installed and the error
    /// is returned. Returns false for unknown ids.
    pub fn remove_probe(&self, probe_id: &str) -> Result<bool> {
        let mut sets = self.write_sets();
        self.remove_locked(&mut sets, probe_id)
    }

    fn remove_locked(&self, sets: &mut ProbeSets, probe_id: &str) -> Result<bool> {
        if sets.pending.remove(probe_id).is_some() {
            debug!(probe_id, "Pending probe removed");
            return Ok(true);
        }
        if sets.installed.contains_key(probe_id) {
            self.instrumenter.unhook(probe_id)?;
            sets.installed.remove(probe_id);
            info!(probe_id, "Probe removed");
            return Ok(true);
        }
        Ok(sets.failed.remove(probe_id).is_some())
    }

    /// Remove every probe not listed in `ids_to_keep`.
    ///
    /// Unhook failures are logged and the probe is retained; the rest of the
    /// batch still runs. Returns the removed ids, sorted.
    pub fn remove_other_probes<I, S>(&self, ids_to_keep: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep: HashSet<String> = ids_to_keep
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();

        let mut sets = self.write_sets();
        let mut doomed: Vec<String> = sets
            .pending
            .keys()
            .chain(sets.installed.keys())
            .chain(sets.failed.keys())
            .filter(|id| !keep.contains(*id))
            .cloned()
            .collect();
        doomed.sort();
        doomed.dedup();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            match self.remove_locked(&mut sets, &id) {
                Ok(true) => removed.push(id),
                Ok(false) => {}
                Err(e) => {
                    error!(probe_id = %id, error = %e, "Failed to remove probe, keeping it installed");
                }
            }
        }
        removed
    }

    /// Retry pending method probes on a newly defined type.
    ///
    /// Returns how many were installed.
    pub fn install_pending_method_probes(&self, type_name: &str) -> usize {
        self.install_pending(|probe| probe.type_name() == Some(type_name))
    }

    /// Retry pending line probes whose file matches a newly loaded path
    pub fn install_pending_line_probes(&self, path: &str) -> usize {
        self.install_pending(|probe| probe.is_line() && probe.file_matches(path))
    }

    fn install_pending(&self, matches: impl Fn(&Probe) -> bool) -> usize {
        let attempts: Vec<Attempt> = {
            let mut sets = self.write_sets();
            if self.is_closed() {
                return 0;
            }
            let mut candidates: Vec<Arc<Probe>> = sets
                .pending
                .values()
                .filter(|probe| matches(probe))
                .cloned()
                .collect();
            candidates.sort_by(|a, b| a.id().cmp(b.id()));
            candidates
                .into_iter()
                .map(|probe| self.attempt(&mut sets, probe))
                .collect()
        };

        let mut installed = 0;
        for attempt in attempts {
            match attempt {
                Attempt::Installed(probe) => {
                    info!(probe_id = %probe.id(), "Pending probe installed");
                    self.status_sink.probe_installed(&probe);
                    installed += 1;
                }
                Attempt::Pending => {}
                Attempt::Failed(probe, e) => self.status_sink.probe_errored(&probe, &e),
            }
        }
        installed
    }

    /// Unhook every installed probe, keeping the ones whose unhook fails
    pub fn clear_hooks(&self) {
        let mut sets = self.write_sets();
        self.clear_hooks_locked(&mut sets);
    }

    fn clear_hooks_locked(&self, sets: &mut ProbeSets) {
        let mut ids: Vec<String> = sets.installed.keys().cloned().collect();
        ids.sort();
        for id in ids {
            match self.instrumenter.unhook(&id) {
                Ok(_) => {
                    sets.installed.remove(&id);
                }
                Err(e) => {
                    error!(probe_id = %id, error = %e, "Failed to unhook probe during clear");
                }
            }
        }
    }

    /// Stop retrying pending probes and unhook everything
    pub fn close(&self) {
        let mut sets = self.write_sets();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        sets.pending.clear();
        self.clear_hooks_locked(&mut sets);
        info!("Probe manager closed");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn pending_probe_ids(&self) -> Vec<String> {
        sorted_keys(&self.read_sets().pending)
    }

    pub fn installed_probe_ids(&self) -> Vec<String> {
        sorted_keys(&self.read_sets().installed)
    }

    /// Failed probe ids with their error messages, sorted by id
    pub fn failed_probes(&self) -> Vec<(String, String)> {
        let mut failed: Vec<(String, String)> = self
            .read_sets()
            .failed
            .iter()
            .map(|(id, (_, message))| (id.clone(), message.clone()))
            .collect();
        failed.sort();
        failed
    }

    /// Definition of any known probe, failed ones included
    pub fn probe(&self, probe_id: &str) -> Option<Arc<Probe>> {
        let sets = self.read_sets();
        sets.installed
            .get(probe_id)
            .or_else(|| sets.pending.get(probe_id))
            .or_else(|| sets.failed.get(probe_id).map(|(probe, _)| probe))
            .cloned()
    }

    pub fn is_failed(&self, probe_id: &str) -> bool {
        self.read_sets().failed.contains_key(probe_id)
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}
