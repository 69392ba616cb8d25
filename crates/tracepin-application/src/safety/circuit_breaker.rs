//! Per-probe overhead circuit breaker
//!
//! Every firing reports the processing time it spent outside the original
//! call (condition evaluation, serialization, notification). The time adds
//! up over the probe's lifetime; once the total exceeds the budget the
//! breaker trips, exactly once, and the probe is disabled for good.
//!
//! # Example
//!
//! ```ignore
//! let breaker = ProbeCircuitBreaker::new("probe-1", Duration::from_millis(500));
//!
//! if let Some(total) = breaker.record(overhead) {
//!     probe.disable();
//!     sink.probe_disabled(&probe, total);
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Circuit breaker counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub firings: u64,
    pub consumed: Duration,
    pub tripped: bool,
}

/// Cumulative processing-time budget for one probe
#[derive(Debug)]
pub struct ProbeCircuitBreaker {
    probe_id: String,
    max_processing_time: Duration,
    consumed_nanos: AtomicU64,
    firings: AtomicU64,
    tripped: AtomicBool,
}

impl ProbeCircuitBreaker {
    /// A zero budget trips after the first recorded firing
    pub fn new(probe_id: impl Into<String>, max_processing_time: Duration) -> Self {
        Self {
            probe_id: probe_id.into(),
            max_processing_time,
            consumed_nanos: AtomicU64::new(0),
            firings: AtomicU64::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    /// Record one firing's overhead.
    ///
    /// Returns the cumulative overhead when this call tripped the breaker.
    /// Concurrent callers racing past the budget see `Some` exactly once.
    pub fn record(&self, overhead: Duration) -> Option<Duration> {
        self.firings.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(overhead.as_nanos()).unwrap_or(u64::MAX);
        let total = self
            .consumed_nanos
            .fetch_add(nanos, Ordering::AcqRel)
            .saturating_add(nanos);
        let total = Duration::from_nanos(total);

        let exceeded = self.max_processing_time.is_zero() || total > self.max_processing_time;
        if !exceeded {
            return None;
        }
        match self
            .tripped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                warn!(
                    probe_id = %self.probe_id,
                    consumed_ms = total.as_millis() as u64,
                    budget_ms = self.max_processing_time.as_millis() as u64,
                    "Probe exceeded its processing budget, circuit breaker tripped"
                );
                Some(total)
            }
            Err(_) => None,
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    pub fn max_processing_time(&self) -> Duration {
        self.max_processing_time
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            firings: self.firings.load(Ordering::Relaxed),
            consumed: Duration::from_nanos(self.consumed_nanos.load(Ordering::Acquire)),
            tripped: self.is_tripped(),
        }
    }
}
