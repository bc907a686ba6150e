//! Job definitions

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueueError;

/// Job Identifier (caller supplied)
pub type JobId = String;

/// Job lifecycle state
///
/// ```text
/// Pending --claim--> Processing --ok--> Completed
///    ^                   |
///    |                   +--fail, retries left--> Failed --backoff elapsed, claim--> Processing
///    |                   +--fail, exhausted-----> Dead
///    +------------------------------------------- Dead (manual DLQ requeue)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting in queue
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Finished successfully (terminal)
    Completed,
    /// Failed, waiting for its backoff to elapse
    Failed,
    /// Retries exhausted, parked in the dead letter queue
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }

    /// Completed and Dead accept no automatic transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }

    /// Whether the state machine allows `self -> to`.
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Dead)
                | (Failed, Processing)
                | (Dead, Pending)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(QueueError::InvalidJob(format!("unknown job state '{other}'"))),
        }
    }
}

/// A submission request. Built by the caller with defaults already applied,
/// see [`crate::QueueConfig::new_job`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub id: JobId,
    pub command: String,
    pub max_retries: u32,
}

impl NewJob {
    pub fn new(id: impl Into<JobId>, command: impl Into<String>, max_retries: u32) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            max_retries,
        }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.id.trim().is_empty() {
            return Err(QueueError::InvalidJob("job id must not be empty".into()));
        }
        if self.command.trim().is_empty() {
            return Err(QueueError::InvalidJob(format!(
                "job '{}' has an empty command",
                self.id
            )));
        }
        Ok(())
    }
}

/// A persisted job entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    /// Finished execution attempts. Bumped by exactly one per recorded outcome.
    pub attempts: u32,
    /// Retries allowed after the first execution.
    pub max_retries: u32,
    /// A Failed job is not claimable before this instant.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Worker currently holding the claim.
    pub worker_id: Option<String>,
    pub last_error: Option<String>,
}

impl Job {
    /// Fresh Pending job for a validated submission.
    pub fn from_new(new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            command: new.command,
            state: JobState::Pending,
            attempts: 0,
            max_retries: new.max_retries,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
            worker_id: None,
            last_error: None,
        }
    }

    /// Pending, or Failed with its backoff elapsed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Pending => true,
            JobState::Failed => self.next_attempt_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    /// The state a failure recorded after `attempts` finished executions lands in.
    pub fn state_after_failure(attempts: u32, max_retries: u32) -> JobState {
        if attempts <= max_retries {
            JobState::Failed
        } else {
            JobState::Dead
        }
    }
}

/// Number of jobs per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
}

impl StateCounts {
    pub fn get(&self, state: JobState) -> usize {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }

    pub fn add(&mut self, state: JobState, n: usize) {
        match state {
            JobState::Pending => self.pending += n,
            JobState::Processing => self.processing += n,
            JobState::Completed => self.completed += n,
            JobState::Failed => self.failed += n,
            JobState::Dead => self.dead += n,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed + self.dead
    }
}

/// Current time truncated to milliseconds, the precision stores persist.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
