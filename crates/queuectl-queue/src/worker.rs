//! Worker loop: claim, execute, record

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::backend::JobStore;
use crate::backoff::BackoffPolicy;
use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::executor::{Executor, Outcome};
use crate::job::{Job, JobState};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Recorded on claimed jobs
    pub worker_id: String,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", std::process::id()),
            poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_queue_config(worker_id: impl Into<String>, config: &QueueConfig) -> Result<Self, QueueError> {
        config.validate()?;
        Ok(Self {
            worker_id: worker_id.into(),
            poll_interval: config.poll_interval(),
            job_timeout: config.job_timeout(),
            backoff: config.backoff()?,
        })
    }
}

/// What happened to one claimed job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: Job,
    pub outcome: Outcome,
}

/// Totals for one `run` of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
}

impl WorkerSummary {
    fn record(&mut self, state: JobState) {
        match state {
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
            JobState::Dead => self.dead += 1,
            _ => {}
        }
    }
}

/// One worker. A process runs one of these; coordination with other workers
/// happens only through the store.
pub struct Worker<S: JobStore + ?Sized, E: Executor + ?Sized> {
    store: Arc<S>,
    executor: Arc<E>,
    config: WorkerConfig,
}

impl<S: JobStore + ?Sized, E: Executor + ?Sized> Worker<S, E> {
    pub fn new(store: Arc<S>, executor: Arc<E>, config: WorkerConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Claim and run at most one job. `Ok(None)` when nothing was eligible.
    pub async fn run_once(&self) -> Result<Option<JobReport>, QueueError> {
        let Some(job) = self.store.claim_next(&self.config.worker_id).await? else {
            return Ok(None);
        };

        info!(
            worker = %self.config.worker_id,
            job_id = %job.id,
            attempt = job.attempts + 1,
            "Processing job"
        );

        let outcome = self.executor.run(&job.command, self.config.job_timeout).await;
        let job = self.record(&job, &outcome).await?;
        Ok(Some(JobReport { job, outcome }))
    }

    async fn record(&self, job: &Job, outcome: &Outcome) -> Result<Job, QueueError> {
        match outcome {
            Outcome::Success => {
                let done = self.store.mark_completed(&job.id).await?;
                info!(job_id = %done.id, attempts = done.attempts, "Job completed");
                Ok(done)
            }
            Outcome::Failure(reason) => {
                let attempt = job.attempts + 1;
                let delay = self.config.backoff.delay(attempt);
                let updated = self
                    .store
                    .mark_failed_or_dead(&job.id, job.attempts, delay, Some(reason.to_string()))
                    .await?;

                if updated.state == JobState::Dead {
                    warn!(
                        job_id = %updated.id,
                        attempts = updated.attempts,
                        reason = %reason,
                        "Job exhausted its retries, moved to dead letter queue"
                    );
                } else {
                    info!(
                        job_id = %updated.id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        reason = %reason,
                        "Job failed, scheduling retry with backoff"
                    );
                }
                Ok(updated)
            }
        }
    }

    /// Poll until `shutdown` flips to true. The flag is checked before every
    /// poll; an in-flight job always runs to its outcome first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerSummary {
        let mut summary = WorkerSummary::default();
        info!(
            worker = %self.config.worker_id,
            store = self.store.name(),
            "Worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(Some(report)) => {
                    summary.record(report.job.state);
                    false
                }
                Ok(None) => true,
                Err(e) if e.is_transient() => {
                    error!(worker = %self.config.worker_id, error = %e, "Queue error");
                    true
                }
                Err(e) => {
                    // A rejected transition means the job was moved under us.
                    // The worker keeps going; nothing else needs undoing.
                    error!(worker = %self.config.worker_id, error = %e, "Failed to record job outcome");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(
            worker = %self.config.worker_id,
            completed = summary.completed,
            failed = summary.failed,
            dead = summary.dead,
            "Worker stopped"
        );
        summary
    }
}
