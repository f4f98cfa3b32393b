//! Fixed-capacity FIFO queue with fail-fast admission.
//!
//! Producers never block: [`BoundedQueue::try_enqueue`] either appends or
//! hands the item back. Consumers block in [`BoundedQueue::dequeue`] until an
//! item arrives or the cancellation token fires.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Why an item was not admitted. The rejected item is handed back.
pub enum TryEnqueueError<T> {
    /// The queue holds `capacity` items.
    Full(T),
    /// The queue was closed.
    Closed(T),
}

impl<T> TryEnqueueError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for TryEnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded, insertion-ordered queue shared by producers and workers.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    available: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    ///
    /// A capacity of zero rejects every item.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            capacity,
            available: Notify::new(),
        }
    }

    /// Maximum number of buffered items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether no items are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append `item` without blocking.
    ///
    /// # Errors
    ///
    /// Hands the item back when the queue is full or closed.
    pub fn try_enqueue(&self, item: T) -> Result<(), TryEnqueueError<T>> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(TryEnqueueError::Closed(item));
            }
            if inner.items.len() >= self.capacity {
                return Err(TryEnqueueError::Full(item));
            }
            inner.items.push_back(item);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest item without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Wait for the oldest item.
    ///
    /// Returns `None` once `cancel` fires or the queue is closed and empty.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so an enqueue between the check and
            // the await is not missed.
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return None;
            }

            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = &mut notified => {}
            }
        }
    }

    /// Close the queue, returning every item that was never dequeued.
    ///
    /// Later enqueues fail with [`TryEnqueueError::Closed`]; blocked
    /// consumers wake up and observe the closed queue.
    pub fn close(&self) -> Vec<T> {
        self.close_if(|| true).unwrap_or_default()
    }

    /// Close the queue only if `decide` returns `true`.
    ///
    /// `decide` runs under the queue lock, so no enqueue can land between
    /// the decision and the close. Returns `None` when the queue was left open.
    pub fn close_if(&self, decide: impl FnOnce() -> bool) -> Option<Vec<T>> {
        let remaining = {
            let mut inner = self.inner.lock();
            if !decide() {
                return None;
            }
            inner.closed = true;
            inner.items.drain(..).collect()
        };
        self.available.notify_waiters();
        Some(remaining)
    }
}
