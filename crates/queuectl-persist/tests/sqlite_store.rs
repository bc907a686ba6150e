use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tempfile::TempDir;

use queuectl_persist::{SqliteConfig, SqliteJobStore};
use queuectl_queue::{
    BackoffPolicy, DeadLetterQueue, JobState, JobStore, NewJob, QueueError, ShellExecutor, Worker,
    WorkerConfig,
};

async fn file_store(dir: &TempDir) -> SqliteJobStore {
    SqliteJobStore::open(&SqliteConfig::file(dir.path().join("queue.db")))
        .await
        .expect("open store")
}

#[tokio::test]
async fn test_submit_claim_fifo() -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteJobStore::open(&SqliteConfig::memory()).await?;
    for id in ["first", "second", "third"] {
        store.submit(NewJob::new(id, "true", 1)).await?;
    }

    let job = store.claim_next("w1").await?.expect("Should have job");
    assert_eq!(job.id, "first");
    assert_eq!(job.state, JobState::Processing);
    assert_eq!(job.worker_id.as_deref(), Some("w1"));

    let ids: Vec<_> = store.list(None).await?.into_iter().map(|j| j.id).collect();
    assert_eq!(ids, ["first", "second", "third"]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_id_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteJobStore::open(&SqliteConfig::memory()).await?;
    store.submit(NewJob::new("j1", "echo one", 3)).await?;

    let err = store.submit(NewJob::new("j1", "echo two", 0)).await.unwrap_err();
    assert!(matches!(err, QueueError::DuplicateId(ref id) if id == "j1"));

    let job = store.get("j1").await?.unwrap();
    assert_eq!(job.command, "echo one");
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.state, JobState::Pending);
    Ok(())
}

#[tokio::test]
async fn test_double_completion_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteJobStore::open(&SqliteConfig::memory()).await?;
    store.submit(NewJob::new("j1", "true", 3)).await?;
    store.claim_next("w").await?.unwrap();

    let done = store.mark_completed("j1").await?;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts, 1);
    assert!(done.worker_id.is_none());

    let err = store.mark_completed("j1").await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidTransition { from: JobState::Completed, .. }
    ));
    assert!(matches!(
        store.mark_completed("ghost").await,
        Err(QueueError::NotFound(_))
    ));
    assert_eq!(store.get("j1").await?.unwrap().state, JobState::Completed);
    Ok(())
}

#[tokio::test]
async fn test_backoff_blocks_reclaim() -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteJobStore::open(&SqliteConfig::memory()).await?;
    store.submit(NewJob::new("j1", "false", 3)).await?;
    let job = store.claim_next("w").await?.unwrap();

    let failed = store
        .mark_failed_or_dead(&job.id, job.attempts, Duration::from_secs(3600), Some("exit code 1".into()))
        .await?;
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.attempts, 1);
    assert_eq!(failed.last_error.as_deref(), Some("exit code 1"));
    assert!(store.claim_next("w").await?.is_none());

    // the older job is still backing off, so the newer one is served
    store.submit(NewJob::new("j2", "true", 0)).await?;
    let next = store.claim_next("w").await?.unwrap();
    assert_eq!(next.id, "j2");
    Ok(())
}

#[tokio::test]
async fn test_retry_exhaustion_and_dlq_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteJobStore::open(&SqliteConfig::memory()).await?);
    store.submit(NewJob::new("j2", "fail", 2)).await?;

    let mut states = Vec::new();
    while let Some(job) = store.claim_next("w").await? {
        let job = store
            .mark_failed_or_dead(&job.id, job.attempts, Duration::ZERO, None)
            .await?;
        states.push((job.state, job.attempts));
        if job.state == JobState::Dead {
            break;
        }
    }
    assert_eq!(
        states,
        [(JobState::Failed, 1), (JobState::Failed, 2), (JobState::Dead, 3)]
    );
    assert!(store.get("j2").await?.unwrap().next_attempt_at.is_none());

    let dlq = DeadLetterQueue::new(store.clone());
    assert_eq!(dlq.list_dead().await?.len(), 1);
    let job = dlq.retry("j2").await?;
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);

    let reclaimed = store.claim_next("w").await?.expect("requeued job is eligible at once");
    assert_eq!(reclaimed.id, "j2");
    Ok(())
}

#[tokio::test]
async fn test_state_survives_restart() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    let before = {
        let store = file_store(&dir).await;
        store.submit(NewJob::new("done", "true", 1)).await?;
        store.submit(NewJob::new("retrying", "false", 4)).await?;
        store.submit(NewJob::new("waiting", "true", 2)).await?;

        store.claim_next("w").await?.unwrap();
        store.mark_completed("done").await?;
        let job = store.claim_next("w").await?.unwrap();
        store
            .mark_failed_or_dead(&job.id, job.attempts, Duration::from_secs(90), Some("exit code 2".into()))
            .await?;

        let snapshot = store.list(None).await?;
        store.close().await;
        snapshot
    };

    let reopened = file_store(&dir).await;
    let after = reopened.list(None).await?;
    assert_eq!(before, after);
    assert_eq!(reopened.counts_by_state().await?.completed, 1);
    assert_eq!(reopened.counts_by_state().await?.failed, 1);
    assert_eq!(reopened.counts_by_state().await?.pending, 1);
    Ok(())
}

#[tokio::test]
async fn test_single_job_single_claimant_across_connections() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    // one pool per simulated worker process, all on the same file
    let mut stores = Vec::new();
    for _ in 0..8 {
        stores.push(Arc::new(file_store(&dir).await));
    }
    stores[0].submit(NewJob::new("only", "true", 0)).await?;

    let claims = join_all(stores.iter().enumerate().map(|(i, store)| {
        let store = store.clone();
        tokio::spawn(async move { store.claim_next(&format!("w{i}")).await })
    }))
    .await;

    let mut winners = 0;
    for claim in claims {
        if claim??.is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_drain_claims_each_job_once() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let mut stores = Vec::new();
    for _ in 0..6 {
        stores.push(Arc::new(file_store(&dir).await));
    }
    for i in 0..40 {
        stores[0].submit(NewJob::new(format!("job-{i:02}"), "true", 0)).await?;
    }

    let drained = join_all(stores.iter().enumerate().map(|(i, store)| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut mine = Vec::new();
            while let Some(job) = store.claim_next(&format!("w{i}")).await? {
                store.mark_completed(&job.id).await?;
                mine.push(job.id);
            }
            Ok::<_, QueueError>(mine)
        })
    }))
    .await;

    let mut seen = HashSet::new();
    for ids in drained {
        for id in ids?? {
            assert!(seen.insert(id.clone()), "{id} claimed twice");
        }
    }
    assert_eq!(seen.len(), 40);
    assert_eq!(stores[0].counts_by_state().await?.completed, 40);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_worker_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteJobStore::open(&SqliteConfig::memory()).await?);
    store.submit(NewJob::new("ok", "true", 3)).await?;
    store.submit(NewJob::new("bad", "exit 1", 1)).await?;

    let worker = Worker::new(
        store.clone(),
        Arc::new(ShellExecutor::new()),
        WorkerConfig {
            worker_id: "e2e".into(),
            poll_interval: Duration::from_millis(20),
            job_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::new(1)?,
        },
    );

    for _ in 0..200 {
        let counts = store.counts_by_state().await?;
        if counts.completed == 1 && counts.dead == 1 {
            break;
        }
        if worker.run_once().await?.is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    let ok = store.get("ok").await?.unwrap();
    assert_eq!((ok.state, ok.attempts), (JobState::Completed, 1));
    let bad = store.get("bad").await?.unwrap();
    assert_eq!((bad.state, bad.attempts), (JobState::Dead, 2));
    assert_eq!(bad.last_error.as_deref(), Some("exit code 1"));
    Ok(())
}
