//! Bounded retry with a fixed delay, cooperative with shutdown.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::deliver::Deliver;
use crate::error::DeliveryError;
use crate::job::Job;

/// Which failures the retry policy may retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Retry every failed attempt.
    #[default]
    Any,
    /// Retry only failures the delivery operation classifies as rate limiting.
    RateLimited,
}

impl RetryOn {
    const fn permits(self, rate_limited: bool) -> bool {
        match self {
            Self::Any => true,
            Self::RateLimited => rate_limited,
        }
    }
}

/// Bounded-attempt retry policy.
///
/// `attempts` counts total calls to `deliver`, including the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    retry_on: RetryOn,
}

impl RetryPolicy {
    /// Create a policy making at most `attempts` calls, sleeping `delay`
    /// between failed ones.
    ///
    /// Zero attempts is treated as one: every admitted job is tried at least once.
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            retry_on: RetryOn::Any,
        }
    }

    /// Restrict which failures are retried.
    #[must_use]
    pub const fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Maximum number of delivery attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay between failed attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Retry filter.
    #[must_use]
    pub const fn retry_on(&self) -> RetryOn {
        self.retry_on
    }

    /// Run `deliverer` against `job` until it succeeds, attempts run out,
    /// the filter refuses a retry, or `shutdown` fires.
    ///
    /// Shutdown is observed before each attempt and during each delay. An
    /// attempt already in progress is never interrupted.
    ///
    /// Returns the number of attempts made on success.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] describing why the job was given up on.
    pub async fn attempt<D: Deliver>(
        &self,
        deliverer: &D,
        job: &Job<D::Payload>,
        shutdown: &CancellationToken,
    ) -> Result<u32, DeliveryError<D::Error>> {
        let mut attempt = 0;
        let mut last = None;

        loop {
            if shutdown.is_cancelled() {
                return Err(DeliveryError::Aborted {
                    attempts: attempt,
                    last,
                });
            }

            attempt += 1;
            let error = match deliverer.deliver(job).await {
                Ok(()) => return Ok(attempt),
                Err(error) => error,
            };

            if attempt >= self.attempts {
                return Err(DeliveryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            if !self.retry_on.permits(deliverer.is_rate_limited(&error)) {
                return Err(DeliveryError::NotRetryable {
                    attempts: attempt,
                    source: error,
                });
            }

            warn!(
                job_id = %job.id(),
                attempt,
                max_attempts = self.attempts,
                error = %error,
                "Delivery attempt failed, retrying"
            );
            last = Some(error);

            if !self.delay.is_zero() {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        return Err(DeliveryError::Aborted { attempts: attempt, last });
                    }
                    () = tokio::time::sleep(self.delay) => {}
                }
            }
        }
    }
}
