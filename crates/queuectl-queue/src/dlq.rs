//! Dead letter queue controller

use std::sync::Arc;
use tracing::info;

use crate::backend::JobStore;
use crate::error::QueueError;
use crate::job::{Job, JobState};

/// Inspection and manual recovery of jobs that exhausted their retries.
pub struct DeadLetterQueue<S: JobStore + ?Sized> {
    store: Arc<S>,
}

impl<S: JobStore + ?Sized> DeadLetterQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn list_dead(&self) -> Result<Vec<Job>, QueueError> {
        self.store.list(Some(JobState::Dead)).await
    }

    /// Move one dead job back to Pending with attempts reset. It becomes
    /// claimable immediately.
    pub async fn retry(&self, id: &str) -> Result<Job, QueueError> {
        match self.store.requeue_from_dlq(id).await {
            Ok(job) => {
                info!(job_id = %id, "Requeued job from dead letter queue");
                Ok(job)
            }
            Err(QueueError::InvalidTransition { .. }) => Err(QueueError::NotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Requeue every dead job, returning how many moved.
    pub async fn retry_all(&self) -> Result<usize, QueueError> {
        let mut moved = 0;
        for job in self.list_dead().await? {
            match self.retry(&job.id).await {
                Ok(_) => moved += 1,
                // requeued concurrently by someone else
                Err(QueueError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(moved)
    }
}
