//! Worker pool, admission and shutdown for one delivery operation.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::deliver::Deliver;
use crate::error::{ConfigError, DeliveryError, ShutdownError, StartError, SubmitError};
use crate::job::{Job, JobId};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::queue::{BoundedQueue, TryEnqueueError};
use crate::retry::RetryPolicy;
use crate::shutdown::{self, ShutdownLatch, ShutdownState};

struct Shared<D: Deliver> {
    name: String,
    config: DispatcherConfig,
    policy: RetryPolicy,
    deliverer: D,
    queue: BoundedQueue<Job<D::Payload>>,
    latch: ShutdownLatch,
    tracker: TaskTracker,
    started: AtomicBool,
    metrics: DispatchMetrics,
}

/// Bounded job dispatcher.
///
/// Producers call [`submit`](Self::submit), which never blocks. A fixed pool
/// of workers started by [`start`](Self::start) pulls jobs in FIFO order and
/// runs the retry policy around the delivery operation. Completion order
/// across workers is not guaranteed.
///
/// The handle is cheap to clone; all clones share one queue and pool.
/// Dropping the last handle without calling [`shutdown`](Self::shutdown)
/// signals the workers to stop; queued jobs are then abandoned and no
/// deadline is applied.
///
/// # Examples
///
/// ```rust
/// use acton_dispatch::{deliver_fn, Dispatcher, DispatcherConfig, Job};
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let deliver = deliver_fn(|job: Job<String>| async move {
///     println!("sending {}", job.payload());
///     Ok::<(), std::io::Error>(())
/// });
///
/// let dispatcher = Dispatcher::new(
///     "mail",
///     DispatcherConfig::default().with_worker_count(2),
///     deliver,
/// )?;
/// dispatcher.start()?;
///
/// dispatcher.submit(Job::new("hello".to_string()))?;
///
/// dispatcher.shutdown(Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher<D: Deliver> {
    shared: Arc<Shared<D>>,
    handles: Arc<HandleGuard>,
}

/// Shared by every handle but not by the workers; cancels them when the
/// last handle goes away.
struct HandleGuard {
    token: CancellationToken,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<D: Deliver> Clone for Dispatcher<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            handles: Arc::clone(&self.handles),
        }
    }
}

impl<D: Deliver> std::fmt::Debug for Dispatcher<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("queue_depth", &self.shared.queue.len())
            .field("state", &self.shared.latch.state())
            .finish_non_exhaustive()
    }
}

impl<D: Deliver> Dispatcher<D> {
    /// Create a dispatcher. Workers are not running until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the name is empty or the configuration is invalid.
    pub fn new(
        name: impl Into<String>,
        config: DispatcherConfig,
        deliverer: D,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        config.validate()?;

        if config.queue_capacity == 0 {
            warn!(dispatcher = %name, "Queue capacity is zero; every submission will be rejected");
        }

        let policy = config.retry_policy();
        let queue = BoundedQueue::new(config.queue_capacity);
        let latch = ShutdownLatch::new();
        let handles = Arc::new(HandleGuard {
            token: latch.token().clone(),
        });

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                config,
                policy,
                deliverer,
                queue,
                latch,
                tracker: TaskTracker::new(),
                started: AtomicBool::new(false),
                metrics: DispatchMetrics::default(),
            }),
            handles,
        })
    }

    /// Dispatcher name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Configuration the dispatcher was built with.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// The delivery operation.
    #[must_use]
    pub fn deliverer(&self) -> &D {
        &self.shared.deliverer
    }

    /// Current shutdown state.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        self.shared.latch.state()
    }

    /// Number of jobs waiting for a worker.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Snapshot of the dispatcher's counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared
            .metrics
            .snapshot(self.shared.queue.len(), self.shared.latch.state())
    }

    /// Admit a job without blocking.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::InvalidJob`] for a blank ID or a payload the delivery
    ///   operation rejects
    /// - [`SubmitError::QueueFull`] when the queue is at capacity
    /// - [`SubmitError::Closed`] once shutdown has started
    pub fn submit(&self, job: Job<D::Payload>) -> Result<JobId, SubmitError> {
        let shared = &self.shared;

        if shared.latch.state() != ShutdownState::Open {
            DispatchMetrics::incr(&shared.metrics.rejected_closed);
            return Err(SubmitError::Closed);
        }

        if job.id().is_empty() {
            DispatchMetrics::incr(&shared.metrics.rejected_invalid);
            return Err(SubmitError::InvalidJob("correlation id is empty".to_string()));
        }
        if let Err(reason) = shared.deliverer.check(job.payload()) {
            DispatchMetrics::incr(&shared.metrics.rejected_invalid);
            debug!(dispatcher = %shared.name, job_id = %job.id(), %reason, "Rejected invalid job");
            return Err(SubmitError::InvalidJob(reason));
        }

        let id = job.id().clone();
        match shared.queue.try_enqueue(job) {
            Ok(()) => {
                DispatchMetrics::incr(&shared.metrics.submitted);
                debug!(dispatcher = %shared.name, job_id = %id, "Job queued");
                Ok(id)
            }
            Err(TryEnqueueError::Full(_)) => {
                DispatchMetrics::incr(&shared.metrics.rejected_full);
                warn!(
                    dispatcher = %shared.name,
                    job_id = %id,
                    capacity = shared.queue.capacity(),
                    "Queue full, job rejected"
                );
                Err(SubmitError::QueueFull {
                    capacity: shared.queue.capacity(),
                })
            }
            Err(TryEnqueueError::Closed(_)) => {
                DispatchMetrics::incr(&shared.metrics.rejected_closed);
                Err(SubmitError::Closed)
            }
        }
    }

    /// Admit a payload under a freshly generated job ID.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_payload(&self, payload: D::Payload) -> Result<JobId, SubmitError> {
        self.submit(Job::new(payload))
    }

    /// Launch `worker_count` workers and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::AlreadyStarted`] on a second call and
    /// [`StartError::Closed`] after shutdown.
    pub fn start(&self) -> Result<(), StartError> {
        let shared = &self.shared;
        if shared.latch.state() != ShutdownState::Open {
            return Err(StartError::Closed);
        }
        if shared.started.swap(true, Ordering::AcqRel) {
            return Err(StartError::AlreadyStarted);
        }

        for worker in 0..shared.config.worker_count {
            shared.tracker.spawn(run_worker(Arc::clone(shared), worker));
        }

        info!(
            dispatcher = %shared.name,
            workers = shared.config.worker_count,
            queue_capacity = shared.config.queue_capacity,
            attempts = shared.policy.attempts(),
            retry_delay_ms = u64::try_from(shared.policy.delay().as_millis()).unwrap_or(u64::MAX),
            retry_on = ?shared.policy.retry_on(),
            "Dispatcher started"
        );
        Ok(())
    }

    /// Wait until shutdown has been requested and every worker has exited.
    ///
    /// Intended for a long-lived supervisor, not per request.
    pub async fn wait(&self) {
        let shared = &self.shared;
        shared.latch.token().cancelled().await;
        shared.tracker.wait().await;
        shared.latch.finish();
    }

    /// Stop admission, signal workers and wait up to `deadline` for them to exit.
    ///
    /// Jobs still queued are discarded. Jobs mid-delivery finish their current
    /// attempt and are abandoned before the next one.
    ///
    /// # Errors
    ///
    /// - [`ShutdownError::DeadlineElapsed`] if workers are still running at
    ///   the deadline; they are not killed
    /// - [`ShutdownError::AlreadyShutDown`] on every call after the first
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ShutdownError> {
        let shared = &self.shared;
        // The latch flips under the queue lock: a submit that got in was
        // admitted while the dispatcher was still open.
        let Some(discarded) = shared.queue.close_if(|| shared.latch.begin()) else {
            return Err(ShutdownError::AlreadyShutDown);
        };

        info!(dispatcher = %shared.name, ?deadline, "Shutdown requested");

        if !discarded.is_empty() {
            DispatchMetrics::add(
                &shared.metrics.discarded_on_shutdown,
                u64::try_from(discarded.len()).unwrap_or(u64::MAX),
            );
            warn!(
                dispatcher = %shared.name,
                count = discarded.len(),
                "Discarding queued jobs that never reached a worker"
            );
        }
        drop(discarded);

        match shutdown::drain(&shared.tracker, deadline).await {
            Ok(()) => {
                shared.latch.finish();
                info!(dispatcher = %shared.name, "Dispatcher stopped");
                Ok(())
            }
            Err(err) => {
                warn!(dispatcher = %shared.name, error = %err, "Dispatcher did not drain in time");
                Err(err)
            }
        }
    }
}

async fn run_worker<D: Deliver>(shared: Arc<Shared<D>>, worker: usize) {
    let token = shared.latch.token().clone();
    debug!(dispatcher = %shared.name, worker, "Worker started");

    loop {
        if token.is_cancelled() {
            break;
        }
        let Some(job) = shared.queue.dequeue(&token).await else {
            break;
        };

        let outcome = AssertUnwindSafe(shared.policy.attempt(&shared.deliverer, &job, &token))
            .catch_unwind()
            .await;
        record_outcome(&shared, worker, &job, outcome);
    }

    debug!(dispatcher = %shared.name, worker, "Worker stopped");
}

fn record_outcome<D: Deliver>(
    shared: &Shared<D>,
    worker: usize,
    job: &Job<D::Payload>,
    outcome: Result<Result<u32, DeliveryError<D::Error>>, Box<dyn Any + Send>>,
) {
    let metrics = &shared.metrics;
    match outcome {
        Ok(Ok(attempts)) => {
            DispatchMetrics::add(&metrics.attempts, u64::from(attempts));
            DispatchMetrics::incr(&metrics.delivered);
            info!(dispatcher = %shared.name, worker, job_id = %job.id(), attempts, "Job delivered");
        }
        Ok(Err(err)) if err.is_aborted() => {
            DispatchMetrics::add(&metrics.attempts, u64::from(err.attempts()));
            DispatchMetrics::incr(&metrics.aborted);
            warn!(
                dispatcher = %shared.name,
                worker,
                job_id = %job.id(),
                attempts = err.attempts(),
                "Job aborted by shutdown"
            );
        }
        Ok(Err(err)) => {
            DispatchMetrics::add(&metrics.attempts, u64::from(err.attempts()));
            DispatchMetrics::incr(&metrics.failed);
            error!(
                dispatcher = %shared.name,
                worker,
                job_id = %job.id(),
                attempts = err.attempts(),
                error = %err,
                "Job dropped after delivery failure"
            );
        }
        Err(panic) => {
            DispatchMetrics::incr(&metrics.panicked);
            error!(
                dispatcher = %shared.name,
                worker,
                job_id = %job.id(),
                panic = panic_message(panic.as_ref()),
                "Delivery panicked; worker continues"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
