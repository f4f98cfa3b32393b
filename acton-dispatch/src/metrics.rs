//! Dispatcher counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::shutdown::ShutdownState;

/// Monotonic counters updated by producers and workers.
#[derive(Debug, Default)]
pub(crate) struct DispatchMetrics {
    pub(crate) submitted: AtomicU64,
    pub(crate) rejected_full: AtomicU64,
    pub(crate) rejected_closed: AtomicU64,
    pub(crate) rejected_invalid: AtomicU64,
    pub(crate) attempts: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) aborted: AtomicU64,
    pub(crate) panicked: AtomicU64,
    pub(crate) discarded_on_shutdown: AtomicU64,
}

impl DispatchMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queue_depth: usize, state: ShutdownState) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            submitted: load(&self.submitted),
            rejected_full: load(&self.rejected_full),
            rejected_closed: load(&self.rejected_closed),
            rejected_invalid: load(&self.rejected_invalid),
            attempts: load(&self.attempts),
            delivered: load(&self.delivered),
            failed: load(&self.failed),
            aborted: load(&self.aborted),
            panicked: load(&self.panicked),
            discarded_on_shutdown: load(&self.discarded_on_shutdown),
            queue_depth,
            state,
        }
    }
}

/// Point-in-time copy of a dispatcher's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Jobs admitted into the queue.
    pub submitted: u64,
    /// Submissions rejected because the queue was full.
    pub rejected_full: u64,
    /// Submissions rejected because shutdown had started.
    pub rejected_closed: u64,
    /// Submissions rejected by validation.
    pub rejected_invalid: u64,
    /// Calls made to the delivery operation.
    pub attempts: u64,
    /// Jobs delivered successfully.
    pub delivered: u64,
    /// Jobs dropped after exhausting retries or hitting a non-retryable error.
    pub failed: u64,
    /// Jobs abandoned because of shutdown.
    pub aborted: u64,
    /// Jobs whose delivery panicked.
    pub panicked: u64,
    /// Jobs still queued when shutdown closed the queue.
    pub discarded_on_shutdown: u64,
    /// Jobs currently buffered.
    pub queue_depth: usize,
    /// Shutdown state at snapshot time.
    pub state: ShutdownState,
}

impl MetricsSnapshot {
    /// Jobs that reached a terminal outcome in a worker.
    #[must_use]
    pub const fn settled(&self) -> u64 {
        self.delivered + self.failed + self.aborted + self.panicked
    }
}
