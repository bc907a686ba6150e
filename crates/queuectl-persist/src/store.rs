use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::debug;

use queuectl_queue::backend::retry_instant;
use queuectl_queue::job;
use queuectl_queue::{Job, JobState, JobStore, NewJob, QueueError, StateCounts};

use crate::sqlite::{connect, SqliteConfig};

const JOB_COLUMNS: &str = "id, command, state, attempts, max_retries, next_attempt_at, created_at, updated_at, worker_id, last_error";

/// Durable job store using SQLite, shared by every worker process.
///
/// The claim is one `UPDATE ... WHERE id = (SELECT ... LIMIT 1) RETURNING`
/// statement. SQLite takes the database write lock before the statement reads
/// anything, so concurrent claimers in any process are serialised by the lock
/// (waiting up to the busy timeout) and each eligible row goes to one caller.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    next_attempt_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    worker_id: Option<String>,
    last_error: Option<String>,
}

fn corrupt(id: &str, what: &str) -> QueueError {
    QueueError::StoreUnavailable(format!("Corrupt row for job '{id}': {what}"))
}

fn from_millis(id: &str, ms: i64) -> Result<DateTime<Utc>, QueueError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| corrupt(id, "timestamp out of range"))
}

impl TryFrom<JobRow> for Job {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|_| corrupt(&row.id, "unknown state"))?;
        let attempts = u32::try_from(row.attempts).map_err(|_| corrupt(&row.id, "attempts"))?;
        let max_retries =
            u32::try_from(row.max_retries).map_err(|_| corrupt(&row.id, "max_retries"))?;
        let next_attempt_at = row
            .next_attempt_at
            .map(|ms| from_millis(&row.id, ms))
            .transpose()?;

        Ok(Job {
            state,
            attempts,
            max_retries,
            next_attempt_at,
            created_at: from_millis(&row.id, row.created_at)?,
            updated_at: from_millis(&row.id, row.updated_at)?,
            id: row.id,
            command: row.command,
            worker_id: row.worker_id,
            last_error: row.last_error,
        })
    }
}

fn unavailable(e: sqlx::Error) -> QueueError {
    QueueError::StoreUnavailable(e.to_string())
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and migrate.
    pub async fn open(config: &SqliteConfig) -> Result<Self, QueueError> {
        Ok(Self::new(connect(config).await?))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch(&self, id: &str) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        row.map(Job::try_from).transpose()
    }

    /// Explain why a guarded update matched no row.
    async fn rejected(&self, id: &str, to: JobState) -> QueueError {
        match self.fetch(id).await {
            Ok(Some(job)) => QueueError::invalid_transition(id, job.state, to),
            Ok(None) => QueueError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn submit(&self, new: NewJob) -> Result<Job, QueueError> {
        new.validate()?;
        let job = Job::from_new(new, job::now());
        let created = job.created_at.timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(JobState::Pending.as_str())
        .bind(i64::from(job.max_retries))
        .bind(created)
        .bind(created)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::DuplicateId(job.id));
        }
        debug!(job_id = %job.id, "Job enqueued");
        Ok(job)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, QueueError> {
        let now = job::now().timestamp_millis();

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET state = 'processing',
                worker_id = ?,
                updated_at = ?
            WHERE id = (
                SELECT id FROM jobs
                WHERE state = 'pending'
                   OR (state = 'failed' AND (next_attempt_at IS NULL OR next_attempt_at <= ?))
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(Job::try_from).transpose()
    }

    async fn mark_completed(&self, id: &str) -> Result<Job, QueueError> {
        let now = job::now().timestamp_millis();
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET state = 'completed', attempts = attempts + 1, updated_at = ?,
                worker_id = NULL, next_attempt_at = NULL, last_error = NULL
            WHERE id = ? AND state = 'processing'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.rejected(id, JobState::Completed).await),
        }
    }

    async fn mark_failed_or_dead(
        &self,
        id: &str,
        attempts_seen: u32,
        backoff: Duration,
        error: Option<String>,
    ) -> Result<Job, QueueError> {
        let now = job::now();
        let retry_at = retry_instant(now, backoff).timestamp_millis();

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET attempts = attempts + 1,
                state = CASE WHEN attempts + 1 <= max_retries THEN 'failed' ELSE 'dead' END,
                next_attempt_at = CASE WHEN attempts + 1 <= max_retries THEN ? ELSE NULL END,
                worker_id = NULL,
                last_error = ?,
                updated_at = ?
            WHERE id = ? AND state = 'processing' AND attempts = ?
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(retry_at)
        .bind(error)
        .bind(now.timestamp_millis())
        .bind(id)
        .bind(i64::from(attempts_seen))
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.rejected(id, JobState::Failed).await),
        }
    }

    async fn requeue_from_dlq(&self, id: &str) -> Result<Job, QueueError> {
        let now = job::now().timestamp_millis();
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET state = 'pending', attempts = 0, next_attempt_at = NULL,
                worker_id = NULL, updated_at = ?
            WHERE id = ? AND state = 'dead'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.rejected(id, JobState::Pending).await),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        self.fetch(id).await
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE state = ? ORDER BY created_at ASC, rowid ASC"
                ))
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at ASC, rowid ASC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(unavailable)?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn counts_by_state(&self) -> Result<StateCounts, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(unavailable)?;

        let mut counts = StateCounts::default();
        for (state, n) in rows {
            let state = state
                .parse::<JobState>()
                .map_err(|_| QueueError::StoreUnavailable(format!("Unknown state '{state}' in store")))?;
            counts.add(state, usize::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }
}
