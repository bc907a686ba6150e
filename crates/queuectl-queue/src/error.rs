//! Queue error types

use crate::job::{JobId, JobState};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job '{0}' already exists")]
    DuplicateId(JobId),

    #[error("Job '{0}' not found")]
    NotFound(JobId),

    #[error("Invalid transition for job '{id}': {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// The backing store could not be reached or locked. Workers retry.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Errors a worker should ride out by polling again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::StoreUnavailable(_))
    }

    pub fn invalid_transition(id: impl Into<JobId>, from: JobState, to: JobState) -> Self {
        QueueError::InvalidTransition {
            id: id.into(),
            from,
            to,
        }
    }
}
