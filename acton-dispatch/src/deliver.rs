//! The pluggable delivery operation.
//!
//! The dispatcher knows nothing about SMTP relays or rendering services;
//! it only drives something that implements [`Deliver`].

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use crate::job::Job;

/// A slow, failure-prone operation invoked once per delivery attempt.
///
/// # Examples
///
/// ```rust
/// use acton_dispatch::{Deliver, Job};
/// use async_trait::async_trait;
///
/// struct Printer;
///
/// #[async_trait]
/// impl Deliver for Printer {
///     type Payload = String;
///     type Error = std::io::Error;
///
///     async fn deliver(&self, job: &Job<String>) -> Result<(), Self::Error> {
///         println!("{}: {}", job.id(), job.payload());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Deliver: Send + Sync + 'static {
    /// Operation-specific job data.
    type Payload: Send + Sync + fmt::Debug + 'static;
    /// Error returned by a failed attempt.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Perform one delivery attempt.
    ///
    /// # Errors
    ///
    /// Any error is handed to the retry policy unchanged.
    async fn deliver(&self, job: &Job<Self::Payload>) -> Result<(), Self::Error>;

    /// Completeness check run by `submit` before a job is admitted.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the payload cannot be delivered.
    fn check(&self, _payload: &Self::Payload) -> Result<(), String> {
        Ok(())
    }

    /// Whether a failure means the remote side asked us to slow down.
    ///
    /// Consulted only when the retry policy uses
    /// [`RetryOn::RateLimited`](crate::RetryOn::RateLimited).
    fn is_rate_limited(&self, _error: &Self::Error) -> bool {
        false
    }
}

/// [`Deliver`] implementation backed by an async closure.
///
/// Created with [`deliver_fn`]. The closure receives an owned clone of the job.
pub struct FnDeliver<P, E, F> {
    f: F,
    _marker: PhantomData<fn(P) -> E>,
}

impl<P, E, F> fmt::Debug for FnDeliver<P, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDeliver").finish_non_exhaustive()
    }
}

/// Wrap an async closure as a delivery operation.
///
/// ```rust
/// use acton_dispatch::{deliver_fn, Job};
///
/// let deliver = deliver_fn(|job: Job<u32>| async move {
///     if *job.payload() > 10 {
///         Err(std::io::Error::other("too large"))
///     } else {
///         Ok(())
///     }
/// });
/// # let _ = deliver;
/// ```
pub fn deliver_fn<P, E, F, Fut>(f: F) -> FnDeliver<P, E, F>
where
    F: Fn(Job<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    FnDeliver {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<P, E, F, Fut> Deliver for FnDeliver<P, E, F>
where
    P: Clone + Send + Sync + fmt::Debug + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(Job<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    type Payload = P;
    type Error = E;

    async fn deliver(&self, job: &Job<P>) -> Result<(), E> {
        (self.f)(job.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deliver_fn_passes_job_through() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let deliver = deliver_fn(move |job: Job<usize>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(*job.payload(), Ordering::SeqCst);
                Ok::<(), io::Error>(())
            }
        });

        deliver.deliver(&Job::new(5)).await.unwrap();
        deliver.deliver(&Job::new(7)).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_default_classification() {
        let deliver = deliver_fn(|_job: Job<()>| async { Err::<(), _>(io::Error::other("nope")) });
        let err = deliver.deliver(&Job::new(())).await.unwrap_err();
        assert!(!deliver.is_rate_limited(&err));
        assert!(deliver.check(&()).is_ok());
    }
}
