//! Notification dispatcher - probe events into the notifier queues
//!
//! Implements both sink ports. Every call builds a payload and enqueues it
//! on the notifier worker; nothing here blocks or touches the network, so
//! it is safe to call from inside a hook.

use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tracepin_core::{Error, EvaluationError, ExecutionContext, Probe};
use tracepin_output::{ProbeNotificationBuilder, ProbeNotifierWorker};
use tracepin_ports::{ProbeEventSink, ProbeStatusSink};
use tracing::trace;

pub struct NotificationDispatcher {
    builder: ProbeNotificationBuilder,
    worker: Arc<ProbeNotifierWorker>,
    /// Probes that already reported EMITTING
    emitting: DashSet<String>,
}

impl NotificationDispatcher {
    pub fn new(builder: ProbeNotificationBuilder, worker: Arc<ProbeNotifierWorker>) -> Self {
        Self {
            builder,
            worker,
            emitting: DashSet::new(),
        }
    }

    pub fn builder(&self) -> &ProbeNotificationBuilder {
        &self.builder
    }

    pub fn worker(&self) -> &Arc<ProbeNotifierWorker> {
        &self.worker
    }

    pub fn is_emitting(&self, probe_id: &str) -> bool {
        self.emitting.contains(probe_id)
    }
}

impl ProbeEventSink for NotificationDispatcher {
    fn probe_executed(&self, context: ExecutionContext) {
        if self.emitting.insert(context.probe.id().to_string()) {
            self.worker
                .add_status(self.builder.build_emitting(&context.probe));
        }
        if !self.worker.add_snapshot(self.builder.build_executed(&context)) {
            trace!(probe_id = %context.probe.id(), "Snapshot not queued");
        }
    }

    fn condition_evaluation_failed(&self, context: ExecutionContext, error: &EvaluationError) {
        self.worker.add_snapshot(
            self.builder
                .build_condition_evaluation_failed(&context, error),
        );
    }

    fn probe_disabled(&self, probe: &Probe, overhead: Duration) {
        self.worker
            .add_status(self.builder.build_disabled(probe, overhead));
    }
}

impl ProbeStatusSink for NotificationDispatcher {
    /// A (re)received definition emits EMITTING again on its next firing
    fn probe_received(&self, probe: &Probe) {
        self.emitting.remove(probe.id());
        self.worker.add_status(self.builder.build_received(probe));
    }

    fn probe_installed(&self, probe: &Probe) {
        self.worker.add_status(self.builder.build_installed(probe));
    }

    fn probe_errored(&self, probe: &Probe, error: &Error) {
        self.worker
            .add_status(self.builder.build_errored(probe, error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracepin_output::NotifierWorkerConfig;
    use tracepin_testing::fixtures;
    use tracepin_testing::MockTransport;

    fn dispatcher() -> (NotificationDispatcher, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let worker = Arc::new(ProbeNotifierWorker::new(
            NotifierWorkerConfig::default(),
            transport.clone(),
        ));
        let builder = ProbeNotificationBuilder::new("svc").with_runtime_id("rt-1");
        (NotificationDispatcher::new(builder, worker), transport)
    }

    #[tokio::test]
    async fn test_emitting_sent_once_per_probe() {
        let (dispatcher, transport) = dispatcher();
        let probe = fixtures::shared(fixtures::method_probe("p1", "A", "b"));

        for _ in 0..3 {
            dispatcher.probe_executed(ExecutionContext::new(Arc::clone(&probe)));
        }
        assert!(dispatcher.is_emitting("p1"));
        assert_eq!(dispatcher.worker().queued_statuses(), 1);
        assert_eq!(dispatcher.worker().queued_snapshots(), 3);

        dispatcher.worker().flush().await.unwrap();
        assert_eq!(
            transport.status_messages(),
            vec!["Probe p1 is emitting".to_string()]
        );
        assert_eq!(transport.snapshots().len(), 3);
    }

    #[tokio::test]
    async fn test_lifecycle_statuses() {
        let (dispatcher, transport) = dispatcher();
        let probe = fixtures::method_probe("p1", "A", "b");

        dispatcher.probe_received(&probe);
        dispatcher.probe_installed(&probe);
        dispatcher.probe_errored(&probe, &Error::instrumentation("boom"));
        dispatcher.probe_disabled(&probe, Duration::from_millis(1500));
        dispatcher.worker().flush().await.unwrap();

        let messages = transport.status_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], "Probe p1 has been received correctly");
        assert_eq!(messages[1], "Probe p1 has been instrumented correctly");
        assert!(messages[2].starts_with("Instrumentation for probe p1 failed"));
        assert!(messages[3].contains("was disabled because it consumed 1.5 seconds"));
    }

    #[tokio::test]
    async fn test_received_resets_emitting() {
        let (dispatcher, _transport) = dispatcher();
        let probe = fixtures::shared(fixtures::method_probe("p1", "A", "b"));

        dispatcher.probe_executed(ExecutionContext::new(Arc::clone(&probe)));
        assert!(dispatcher.is_emitting("p1"));
        dispatcher.probe_received(&probe);
        assert!(!dispatcher.is_emitting("p1"));
    }

    #[tokio::test]
    async fn test_condition_failure_enqueues_snapshot() {
        let (dispatcher, transport) = dispatcher();
        let probe = fixtures::shared(fixtures::method_probe("p1", "A", "b"));

        dispatcher.condition_evaluation_failed(
            ExecutionContext::new(probe),
            &EvaluationError::UndefinedReference("x".to_string()),
        );
        assert_eq!(dispatcher.worker().queued_statuses(), 0);
        dispatcher.worker().flush().await.unwrap();
        assert_eq!(transport.snapshots().len(), 1);
    }
}
