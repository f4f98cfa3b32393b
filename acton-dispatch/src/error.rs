//! Error types for the dispatcher.

use std::time::Duration;
use thiserror::Error;

/// Admission errors returned to the producer by
/// [`Dispatcher::submit`](crate::Dispatcher::submit).
///
/// These are never retried internally; the caller decides whether to
/// resubmit later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The queue is at capacity.
    #[error("queue is full (capacity: {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },
    /// Shutdown has started; the job would never be processed.
    #[error("dispatcher is shutting down")]
    Closed,
    /// The job has an empty correlation ID or an incomplete payload.
    #[error("invalid job: {0}")]
    InvalidJob(String),
}

/// Terminal result of the retry policy for a single job.
#[derive(Debug, Error)]
pub enum DeliveryError<E> {
    /// Every attempt failed.
    #[error("delivery failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: E,
    },
    /// The retry filter refused to retry this failure.
    #[error("delivery failed on attempt {attempts} with a non-retryable error: {source}")]
    NotRetryable {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: E,
    },
    /// Shutdown was signalled before the next attempt or during a retry delay.
    #[error("delivery aborted by shutdown after {attempts} attempt(s)")]
    Aborted {
        /// Number of attempts made before the abort.
        attempts: u32,
        /// Error from the last attempt, if any attempt was made.
        last: Option<E>,
    },
}

impl<E> DeliveryError<E> {
    /// Number of delivery attempts made before this outcome.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::NotRetryable { attempts, .. }
            | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    /// Whether the job was abandoned because of shutdown rather than failure.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Errors from [`Dispatcher::shutdown`](crate::Dispatcher::shutdown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// Workers did not settle before the deadline. They are not killed.
    #[error("shutdown deadline of {deadline:?} elapsed with {active_workers} worker(s) still running")]
    DeadlineElapsed {
        /// The deadline supplied by the caller.
        deadline: Duration,
        /// Workers still running when the deadline elapsed.
        active_workers: usize,
    },
    /// Shutdown was already requested by an earlier call.
    #[error("dispatcher was already shut down")]
    AlreadyShutDown,
}

/// Errors from [`Dispatcher::start`](crate::Dispatcher::start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartError {
    /// The worker pool is already running.
    #[error("worker pool is already running")]
    AlreadyStarted,
    /// Shutdown has started; workers can no longer be launched.
    #[error("dispatcher is shutting down")]
    Closed,
}

/// Invalid dispatcher configuration, reported before any worker starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `worker_count` was zero.
    #[error("worker_count must be at least 1")]
    NoWorkers,
    /// The dispatcher name was empty.
    #[error("dispatcher name must not be empty")]
    EmptyName,
}
