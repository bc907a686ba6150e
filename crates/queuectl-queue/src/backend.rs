//! Job Store Trait

use async_trait::async_trait;
use std::time::Duration;

use crate::error::QueueError;
use crate::job::{Job, JobState, NewJob, StateCounts};

/// Durable table of jobs with atomic state-transition primitives.
///
/// Implementations must make [`JobStore::claim_next`] indivisible with respect
/// to every other caller, including callers in other processes for stores that
/// are shared between processes. All other mutations address one job by id and
/// re-check its source state as part of the write.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Insert a Pending job. Fails with `DuplicateId` if the id exists.
    async fn submit(&self, job: NewJob) -> Result<Job, QueueError>;

    /// Atomically move the oldest eligible job to Processing and return it.
    /// Losing a race to another claimer is `Ok(None)`, never an error.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, QueueError>;

    /// Processing -> Completed, counting the attempt.
    async fn mark_completed(&self, id: &str) -> Result<Job, QueueError>;

    /// Record a failed attempt. `attempts_seen` is the count carried by the
    /// claimed job; the update only applies while the job is still Processing
    /// with that count. The new count decides between Failed (with
    /// `next_attempt_at = now + backoff`) and Dead.
    async fn mark_failed_or_dead(
        &self,
        id: &str,
        attempts_seen: u32,
        backoff: Duration,
        error: Option<String>,
    ) -> Result<Job, QueueError>;

    /// Dead -> Pending with attempts reset and no backoff.
    async fn requeue_from_dlq(&self, id: &str) -> Result<Job, QueueError>;

    async fn get(&self, id: &str) -> Result<Option<Job>, QueueError>;

    /// Snapshot in insertion order, optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError>;

    async fn counts_by_state(&self) -> Result<StateCounts, QueueError>;
}

/// `now + delay`, saturating instead of overflowing for very long backoffs.
pub fn retry_instant(
    now: chrono::DateTime<chrono::Utc>,
    delay: Duration,
) -> chrono::DateTime<chrono::Utc> {
    let delta = chrono::TimeDelta::from_std(delay).unwrap_or(chrono::TimeDelta::MAX);
    now.checked_add_signed(delta)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}
