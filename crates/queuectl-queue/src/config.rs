//! Process-wide queue defaults

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::QueueError;
use crate::job::NewJob;

pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Validated defaults handed to submission and to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Default retries for jobs submitted without one (0-10)
    pub max_retries: u32,
    /// Backoff base in seconds (1-10)
    pub backoff_base: u32,
    /// Hard wall-clock limit per execution
    pub job_timeout_secs: u64,
    /// Idle sleep between empty polls
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2,
            job_timeout_secs: 300,
            poll_interval_ms: 500,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(QueueError::Config(format!(
                "max_retries must be between 0 and {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        BackoffPolicy::new(self.backoff_base)?;
        if self.job_timeout_secs == 0 {
            return Err(QueueError::Config("job_timeout_secs must be at least 1".into()));
        }
        if self.poll_interval_ms < 10 {
            return Err(QueueError::Config(format!(
                "poll_interval_ms must be at least 10, got {}",
                self.poll_interval_ms
            )));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Result<BackoffPolicy, QueueError> {
        BackoffPolicy::new(self.backoff_base)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Build a submission, falling back to the configured retry default.
    pub fn new_job(
        &self,
        id: impl Into<String>,
        command: impl Into<String>,
        max_retries: Option<u32>,
    ) -> Result<NewJob, QueueError> {
        let max_retries = max_retries.unwrap_or(self.max_retries);
        if max_retries > MAX_RETRIES_LIMIT {
            return Err(QueueError::Config(format!(
                "max_retries must be between 0 and {MAX_RETRIES_LIMIT}, got {max_retries}"
            )));
        }
        let job = NewJob::new(id, command, max_retries);
        job.validate()?;
        Ok(job)
    }
}
