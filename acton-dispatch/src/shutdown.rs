//! Single-shot shutdown latch and drain coordination.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::ShutdownError;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Lifecycle of a dispatcher's shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    /// Accepting jobs.
    Open,
    /// Shutdown requested; admission stopped, workers winding down.
    Closing,
    /// Every worker has exited.
    Closed,
}

/// One-way `Open -> Closing -> Closed` latch paired with a broadcast token.
///
/// Only the caller that wins [`begin`](Self::begin) performs the close, so
/// the close can never run twice.
#[derive(Debug)]
pub(crate) struct ShutdownLatch {
    state: AtomicU8,
    token: CancellationToken,
}

impl ShutdownLatch {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(OPEN),
            token: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::Acquire) {
            OPEN => ShutdownState::Open,
            CLOSING => ShutdownState::Closing,
            _ => ShutdownState::Closed,
        }
    }

    /// Move `Open -> Closing` and fire the token. Returns `true` for exactly
    /// one caller.
    pub(crate) fn begin(&self) -> bool {
        let won = self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.token.cancel();
        }
        won
    }

    /// Move `Closing -> Closed`. No effect in any other state.
    pub(crate) fn finish(&self) {
        let _ = self
            .state
            .compare_exchange(CLOSING, CLOSED, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Wait for every tracked worker to exit, giving up after `deadline`.
///
/// Workers still running at the deadline are left alone.
pub(crate) async fn drain(tracker: &TaskTracker, deadline: Duration) -> Result<(), ShutdownError> {
    tracker.close();
    tokio::time::timeout(deadline, tracker.wait())
        .await
        .map_err(|_| ShutdownError::DeadlineElapsed {
            deadline,
            active_workers: tracker.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_is_single_shot() {
        let latch = ShutdownLatch::new();
        assert_eq!(latch.state(), ShutdownState::Open);
        assert!(!latch.token().is_cancelled());

        assert!(latch.begin());
        assert_eq!(latch.state(), ShutdownState::Closing);
        assert!(latch.token().is_cancelled());

        assert!(!latch.begin());
        latch.finish();
        assert_eq!(latch.state(), ShutdownState::Closed);
        assert!(!latch.begin());
        assert_eq!(latch.state(), ShutdownState::Closed);
    }

    #[test]
    fn test_finish_requires_closing() {
        let latch = ShutdownLatch::new();
        latch.finish();
        assert_eq!(latch.state(), ShutdownState::Open);
    }

    #[tokio::test]
    async fn test_drain_empty_tracker() {
        let tracker = TaskTracker::new();
        assert!(drain(&tracker, Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_reports_stragglers() {
        let tracker = TaskTracker::new();
        tracker.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let err = drain(&tracker, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(
            err,
            ShutdownError::DeadlineElapsed {
                deadline: Duration::from_secs(1),
                active_workers: 1,
            }
        );
    }
}
