//! Notifier Transport Port
//!
//! Outbound delivery of status and snapshot payloads to the backend.
//! Implementations report failures as `Error::AgentCommunication` rather than
//! returning sentinels; the notifier worker logs them and retries on its next
//! interval.

use async_trait::async_trait;
use tracepin_core::{Result, SnapshotPayload, StatusPayload};

#[async_trait]
pub trait NotifierTransport: Send + Sync {
    async fn send_status(&self, payload: &StatusPayload) -> Result<()>;

    /// Send every snapshot accumulated since the previous flush in one call
    async fn send_snapshot_batch(&self, payloads: &[SnapshotPayload]) -> Result<()>;

    /// Name of this transport (for logging/identification)
    fn name(&self) -> &str;
}

/// No-op transport for hosts without a backend
pub struct NullTransport;

#[async_trait]
impl NotifierTransport for NullTransport {
    async fn send_status(&self, _payload: &StatusPayload) -> Result<()> {
        Ok(())
    }

    async fn send_snapshot_batch(&self, _payloads: &[SnapshotPayload]) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
