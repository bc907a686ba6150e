//! In-memory job store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::{retry_instant, JobStore};
use crate::error::QueueError;
use crate::job::{self, Job, JobId, JobState, NewJob, StateCounts};

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Insertion order, which is also creation order.
    order: Vec<JobId>,
}

/// Process-local store. All mutations, claims included, run under one write
/// lock, so they are linearizable between tasks of this process.
#[derive(Debug, Default, Clone)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn processing_job<'a>(inner: &'a mut Inner, id: &str, to: JobState) -> Result<&'a mut Job, QueueError> {
    let job = inner
        .jobs
        .get_mut(id)
        .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
    if job.state != JobState::Processing {
        return Err(QueueError::invalid_transition(id, job.state, to));
    }
    Ok(job)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn submit(&self, new: NewJob) -> Result<Job, QueueError> {
        new.validate()?;
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&new.id) {
            return Err(QueueError::DuplicateId(new.id));
        }

        let job = Job::from_new(new, job::now());
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, QueueError> {
        let mut inner = self.inner.write().await;
        let now = job::now();

        let Some(id) = inner
            .order
            .iter()
            .find(|id| inner.jobs.get(*id).is_some_and(|j| j.is_eligible(now)))
            .cloned()
        else {
            return Ok(None);
        };

        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.state = JobState::Processing;
        job.worker_id = Some(worker_id.to_string());
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_completed(&self, id: &str) -> Result<Job, QueueError> {
        let mut inner = self.inner.write().await;
        let job = processing_job(&mut inner, id, JobState::Completed)?;
        job.state = JobState::Completed;
        job.attempts += 1;
        job.worker_id = None;
        job.next_attempt_at = None;
        job.last_error = None;
        job.updated_at = job::now();
        Ok(job.clone())
    }

    async fn mark_failed_or_dead(
        &self,
        id: &str,
        attempts_seen: u32,
        backoff: Duration,
        error: Option<String>,
    ) -> Result<Job, QueueError> {
        let mut inner = self.inner.write().await;
        let job = processing_job(&mut inner, id, JobState::Failed)?;
        if job.attempts != attempts_seen {
            return Err(QueueError::invalid_transition(id, job.state, JobState::Failed));
        }

        let now = job::now();
        job.attempts += 1;
        job.state = Job::state_after_failure(job.attempts, job.max_retries);
        job.next_attempt_at = match job.state {
            JobState::Failed => Some(retry_instant(now, backoff)),
            _ => None,
        };
        job.worker_id = None;
        job.last_error = error;
        job.updated_at = now;

        tracing::debug!(
            job_id = %id,
            attempts = job.attempts,
            state = %job.state,
            "Recorded failed attempt"
        );
        Ok(job.clone())
    }

    async fn requeue_from_dlq(&self, id: &str) -> Result<Job, QueueError> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if job.state != JobState::Dead {
            return Err(QueueError::invalid_transition(id, job.state, JobState::Pending));
        }
        job.state = JobState::Pending;
        job.attempts = 0;
        job.next_attempt_at = None;
        job.worker_id = None;
        job.updated_at = job::now();
        Ok(job.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.inner.read().await.jobs.get(id).cloned())
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|j| state.map_or(true, |s| j.state == s))
            .cloned()
            .collect())
    }

    async fn counts_by_state(&self) -> Result<StateCounts, QueueError> {
        let inner = self.inner.read().await;
        let mut counts = StateCounts::default();
        for job in inner.jobs.values() {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_then_claim() {
        let store = MemoryJobStore::new();
        let job = store.submit(NewJob::new("j1", "true", 3)).await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);

        let claimed = store.claim_next("w1").await.unwrap().expect("Should have job");
        assert_eq!(claimed.id, "j1");
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.worker_id.as_deref(), Some("w1"));

        assert!(store.claim_next("w2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_without_overwrite() {
        let store = MemoryJobStore::new();
        store.submit(NewJob::new("j1", "echo first", 3)).await.unwrap();

        let err = store.submit(NewJob::new("j1", "echo second", 1)).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateId(ref id) if id == "j1"));

        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.command, "echo first");
        assert_eq!(job.max_retries, 3);
    }

    #[tokio::test]
    async fn test_claim_is_fifo_by_creation() {
        let store = MemoryJobStore::new();
        for id in ["a", "b", "c"] {
            store.submit(NewJob::new(id, "true", 0)).await.unwrap();
        }
        let mut seen = Vec::new();
        while let Some(job) = store.claim_next("w").await.unwrap() {
            seen.push(job.id);
        }
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_job_waits_for_backoff() {
        let store = MemoryJobStore::new();
        store.submit(NewJob::new("j1", "false", 3)).await.unwrap();
        let job = store.claim_next("w").await.unwrap().unwrap();

        let failed = store
            .mark_failed_or_dead(&job.id, job.attempts, Duration::from_secs(60), Some("exit code 1".into()))
            .await
            .unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.next_attempt_at.unwrap() > failed.updated_at);
        assert!(store.claim_next("w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_attempt_count_is_rejected() {
        let store = MemoryJobStore::new();
        store.submit(NewJob::new("j1", "false", 3)).await.unwrap();
        let job = store.claim_next("w").await.unwrap().unwrap();

        let err = store
            .mark_failed_or_dead(&job.id, job.attempts + 7, Duration::ZERO, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));
        assert_eq!(store.get("j1").await.unwrap().unwrap().state, JobState::Processing);
    }

    #[tokio::test]
    async fn test_second_completion_rejected() {
        let store = MemoryJobStore::new();
        store.submit(NewJob::new("j1", "true", 3)).await.unwrap();
        store.claim_next("w").await.unwrap().unwrap();

        let done = store.mark_completed("j1").await.unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.attempts, 1);

        let err = store.mark_completed("j1").await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition { from: JobState::Completed, to: JobState::Completed, .. }
        ));
        assert_eq!(store.get("j1").await.unwrap().unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let store = MemoryJobStore::new();
        assert!(matches!(store.mark_completed("nope").await, Err(QueueError::NotFound(_))));
        assert!(matches!(store.requeue_from_dlq("nope").await, Err(QueueError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters_and_counts() {
        let store = MemoryJobStore::new();
        store.submit(NewJob::new("a", "true", 0)).await.unwrap();
        store.submit(NewJob::new("b", "true", 0)).await.unwrap();
        store.claim_next("w").await.unwrap();

        let pending = store.list(Some(JobState::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "b");

        let all: Vec<_> = store.list(None).await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(all, ["a", "b"]);

        let counts = store.counts_by_state().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total(), 2);
    }
}
