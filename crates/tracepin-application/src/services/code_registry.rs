//! Code registry
//!
//! Tracks source units the host has loaded so line probes can target one
//! file instead of hooking every executed line. The host reports loads
//! through [`CodeRegistry::register`]; loads before [`CodeRegistry::start`]
//! are ignored. A registry that has not started yet may still learn about a
//! file later, a stopped one will not.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracepin_core::{path_matches_suffix, Error, Result};
use tracepin_ports::CodeHandle;
use tracing::{debug, warn};

/// Path to code-unit map, fed by host code-loading events
#[derive(Debug, Default)]
pub struct CodeRegistry {
    active: AtomicBool,
    stopped: AtomicBool,
    files: RwLock<HashMap<String, CodeHandle>>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_files(&self) -> RwLockReadGuard<'_, HashMap<String, CodeHandle>> {
        match self.files.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Code registry read lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_files(&self) -> RwLockWriteGuard<'_, HashMap<String, CodeHandle>> {
        match self.files.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Code registry write lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Begin accepting code-loading events
    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
        if !self.active.swap(true, Ordering::AcqRel) {
            debug!("Code tracking started");
        }
    }

    /// Stop tracking and forget every registered unit
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.stopped.store(true, Ordering::Release);
        self.write_files().clear();
        debug!("Code tracking stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Tracking was started and then stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Record a loaded unit. Returns false when tracking is not active.
    ///
    /// A unit reloaded under the same path replaces the old handle.
    pub fn register(&self, path: impl Into<String>, handle: CodeHandle) -> bool {
        if !self.is_active() {
            return false;
        }
        let path = path.into();
        debug!(path = %path, "Code unit loaded");
        self.write_files().insert(path, handle);
        true
    }

    /// Find the unit for a path or path suffix.
    ///
    /// An exact path wins. Otherwise the suffix must match on a
    /// path-component boundary and identify exactly one unit.
    /// `Ok(None)` means nothing matched.
    pub fn resolve(&self, path_suffix: &str) -> Result<Option<CodeHandle>> {
        let files = self.read_files();
        if let Some(handle) = files.get(path_suffix) {
            return Ok(Some(handle.clone()));
        }

        let mut matches: Vec<(&String, &CodeHandle)> = files
            .iter()
            .filter(|(path, _)| path_matches_suffix(path, path_suffix))
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop().map(|(_, handle)| handle.clone())),
            _ => {
                let mut paths: Vec<String> = matches.iter().map(|(p, _)| (*p).clone()).collect();
                paths.sort();
                Err(Error::MultiplePathsMatch {
                    suffix: path_suffix.to_string(),
                    paths,
                })
            }
        }
    }

    /// Registered path of a handle
    pub fn path_of(&self, handle: &CodeHandle) -> Option<String> {
        self.read_files()
            .iter()
            .find(|(_, h)| *h == handle)
            .map(|(path, _)| path.clone())
    }

    pub fn clear(&self) {
        self.write_files().clear();
    }

    pub fn len(&self) -> usize {
        self.read_files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_files().is_empty()
    }
}
