//! Composition root for dynamic instrumentation
//!
//! `DynamicInstrumentation` constructs and owns every component: code
//! registry, serializer, instrumenter, probe manager, notification
//! dispatcher and notifier worker. There is no global state; a host keeps
//! one instance and forwards its events to it.
//!
//! ```text
//! host code-load ──► on_code_loaded ──► CodeRegistry ──► retry pending lines
//! host type def  ──► on_type_defined ─────────────────► retry pending methods
//! remote config  ──► apply_probe_snapshot ──► ProbeSnapshotSync ──► ProbeManager
//! hook firing    ──► NotificationDispatcher ──► ProbeNotifierWorker ──► transport
//! ```
//!
//! ## Config
//!
//! Config values are read once at construction. Changing them requires
//! building a new instance.

use crate::capture::{CustomSerializers, Redactor, Serializer};
use crate::error::{Error, Result};
use crate::services::{
    CodeRegistry, Instrumenter, InstrumenterSettings, NotificationDispatcher, ProbeDefaults,
    ProbeManager, ProbeSnapshotSync, SyncReport,
};
use serde_json::Value as Json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracepin_config::{Config, ConfigError};
use tracepin_output::{NotifierWorkerConfig, ProbeNotificationBuilder, ProbeNotifierWorker};
use tracepin_ports::{CodeHandle, InstrumentationTargetRef, NotifierTransportRef};
use tracing::{debug, info, warn};

pub struct DynamicInstrumentation {
    registry: Arc<CodeRegistry>,
    serializer: Arc<Serializer>,
    instrumenter: Arc<Instrumenter>,
    manager: Arc<ProbeManager>,
    dispatcher: Arc<NotificationDispatcher>,
    worker: Arc<ProbeNotifierWorker>,
    sync: ProbeSnapshotSync,
    shut_down: AtomicBool,
}

impl DynamicInstrumentation {
    /// Build every component from `config`
    pub fn new(
        config: &Config,
        target: InstrumentationTargetRef,
        transport: NotifierTransportRef,
    ) -> Result<Self> {
        Self::with_custom_serializers(config, target, transport, CustomSerializers::new())
    }

    /// Like [`DynamicInstrumentation::new`], with host-specific serializers
    pub fn with_custom_serializers(
        config: &Config,
        target: InstrumentationTargetRef,
        transport: NotifierTransportRef,
        custom: CustomSerializers,
    ) -> Result<Self> {
        config.validate().map_err(ConfigError::ValidationError)?;

        let registry = Arc::new(CodeRegistry::new());
        let serializer = Arc::new(
            Serializer::new(Redactor::new(&config.redaction), config.capture.to_bounds())
                .with_custom_serializers(custom),
        );
        let instrumenter = Arc::new(Instrumenter::new(
            target,
            Arc::clone(&registry),
            Arc::clone(&serializer),
            InstrumenterSettings::from_config(&config.instrumentation),
        ));

        let worker = Arc::new(ProbeNotifierWorker::new(
            NotifierWorkerConfig::from_settings(&config.notifier),
            transport,
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            ProbeNotificationBuilder::from_settings(&config.service),
            Arc::clone(&worker),
        ));

        let manager = Arc::new(ProbeManager::new(
            Arc::clone(&instrumenter),
            dispatcher.clone(),
            dispatcher.clone(),
        ));
        let sync = ProbeSnapshotSync::new(
            Arc::clone(&manager),
            dispatcher.clone(),
            ProbeDefaults::default(),
        );

        debug!(service = %config.service.name, "Dynamic instrumentation components built");
        Ok(Self {
            registry,
            serializer,
            instrumenter,
            manager,
            dispatcher,
            worker,
            sync,
            shut_down: AtomicBool::new(false),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(Error::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Start code tracking and the notifier loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.ensure_running()?;
        self.registry.start();
        if !self.worker.start() && !self.worker.is_running() {
            return Err(Error::Runtime(
                "the notifier worker must be started inside a tokio runtime".to_string(),
            ));
        }
        info!("Dynamic instrumentation started");
        Ok(())
    }

    /// Host loaded a source unit. Returns how many pending line probes
    /// were installed as a result.
    pub fn on_code_loaded(&self, path: &str, handle: CodeHandle) -> usize {
        if self.shut_down.load(Ordering::Acquire) || !self.registry.register(path, handle) {
            return 0;
        }
        self.manager.install_pending_line_probes(path)
    }

    /// Host defined a type. Returns how many pending method probes were
    /// installed as a result.
    pub fn on_type_defined(&self, type_name: &str) -> usize {
        if self.shut_down.load(Ordering::Acquire) {
            return 0;
        }
        self.manager.install_pending_method_probes(type_name)
    }

    /// Reconcile installed probes with a full remote snapshot
    pub fn apply_probe_snapshot(&self, desired: &[Json]) -> Result<SyncReport> {
        self.ensure_running()?;
        Ok(self.sync.apply(desired))
    }

    /// Unhook everything, flush what is queued and stop the notifier.
    ///
    /// Waits at most the configured stop timeout for the loop. Later calls
    /// are no-ops.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.manager.close();
        self.registry.stop();
        if !self.worker.is_running() {
            // No loop to do the final flush
            if let Err(e) = self.worker.flush().await {
                warn!(error = %e, "Final notifier flush failed");
            }
        }
        self.worker.stop().await;
        info!(stats = ?self.worker.stats(), "Dynamic instrumentation shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub fn registry(&self) -> &Arc<CodeRegistry> {
        &self.registry
    }

    pub fn serializer(&self) -> &Arc<Serializer> {
        &self.serializer
    }

    pub fn instrumenter(&self) -> &Arc<Instrumenter> {
        &self.instrumenter
    }

    pub fn probe_manager(&self) -> &Arc<ProbeManager> {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn notifier(&self) -> &Arc<ProbeNotifierWorker> {
        &self.worker
    }
}
