//! Job definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque correlation identifier for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is empty (blank IDs are rejected at submission).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One unit of work.
///
/// A job is immutable once constructed. The queue owns it while it is
/// buffered; exactly one worker owns it after dequeue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job<P> {
    id: JobId,
    payload: P,
}

impl<P> Job<P> {
    /// Create a job with a freshly generated ID.
    #[must_use]
    pub fn new(payload: P) -> Self {
        Self {
            id: JobId::new(),
            payload,
        }
    }

    /// Create a job with a caller-supplied correlation ID.
    #[must_use]
    pub fn with_id(id: impl Into<JobId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// The job's correlation ID.
    #[must_use]
    pub const fn id(&self) -> &JobId {
        &self.id
    }

    /// The operation-specific payload.
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// Split the job into its ID and payload.
    #[must_use]
    pub fn into_parts(self) -> (JobId, P) {
        (self.id, self.payload)
    }
}
