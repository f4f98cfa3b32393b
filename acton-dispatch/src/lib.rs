//! Bounded in-process job dispatcher.
//!
//! A fixed-capacity queue serviced by a fixed pool of workers, each of
//! which runs a bounded retry policy around a pluggable delivery operation:
//!
//! - **Fail-fast admission**: [`Dispatcher::submit`] never blocks; a full
//!   queue rejects with [`SubmitError::QueueFull`]
//! - **Worker pool**: `worker_count` Tokio tasks pulling jobs in FIFO order,
//!   isolated from panics in the delivery operation
//! - **Bounded retry**: a fixed number of total attempts with a fixed delay,
//!   optionally restricted to rate-limit failures via [`RetryOn`]
//! - **Coordinated shutdown**: a single-shot latch stops admission, wakes
//!   idle and sleeping workers, and waits for them against a deadline
//!
//! Delivery is at-most-once and best-effort. Jobs are not persisted, and
//! the producer only ever sees the admission result; everything after that
//! is reported through `tracing` and [`MetricsSnapshot`].
//!
//! # Example
//!
//! ```rust
//! use acton_dispatch::{deliver_fn, Dispatcher, DispatcherConfig, Job, SubmitError};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dispatcher = Dispatcher::new(
//!     "render",
//!     DispatcherConfig::default()
//!         .with_worker_count(4)
//!         .with_queue_capacity(64)
//!         .with_retry_count(3)
//!         .with_retry_delay(Duration::from_secs(2)),
//!     deliver_fn(|job: Job<String>| async move {
//!         println!("rendering {}", job.payload());
//!         Ok::<(), std::io::Error>(())
//!     }),
//! )?;
//! dispatcher.start()?;
//!
//! match dispatcher.submit_payload("invoice-17".to_string()) {
//!     Ok(id) => println!("queued {id}"),
//!     Err(SubmitError::QueueFull { .. }) => println!("busy, try later"),
//!     Err(err) => return Err(err.into()),
//! }
//!
//! dispatcher.shutdown(Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod deliver;
mod dispatcher;
mod error;
#[cfg(feature = "axum")]
pub mod http;
mod job;
mod metrics;
pub mod queue;
mod retry;
mod shutdown;

pub use config::DispatcherConfig;
pub use deliver::{deliver_fn, Deliver, FnDeliver};
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, DeliveryError, ShutdownError, StartError, SubmitError};
pub use job::{Job, JobId};
pub use metrics::MetricsSnapshot;
pub use queue::BoundedQueue;
pub use retry::{RetryOn, RetryPolicy};
pub use shutdown::ShutdownState;

// Re-exported so delivery implementations don't need a direct dependency.
pub use async_trait::async_trait;
