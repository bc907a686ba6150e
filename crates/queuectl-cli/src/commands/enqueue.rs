//! Enqueue command - submit a job
//!
//! Usage:
//! ```bash
//! queuectl enqueue '{"id":"job1","command":"echo hello"}'
//! queuectl enqueue '{"id":"job2","command":"exit 1","max_retries":2}'
//! queuectl enqueue --file job.json
//! ```

use anyhow::{bail, Context as _, Result};
use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;

use queuectl_queue::{JobStore, QueueError};

use crate::{print_success, Context};

/// Arguments for the enqueue command
#[derive(Args)]
pub struct EnqueueArgs {
    /// Job as JSON: {"id": "...", "command": "...", "max_retries": N}
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    job: Option<String>,

    /// Read the job JSON from a file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct JobPayload {
    id: String,
    command: String,
    #[serde(default)]
    max_retries: Option<u32>,
}

fn parse_payload(raw: &str) -> Result<JobPayload> {
    let mut text = raw.trim();
    // cmd.exe passes single quotes through verbatim
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        text = &text[1..text.len() - 1];
    }
    serde_json::from_str(text).with_context(|| format!("Invalid job JSON: {}", raw))
}

/// Run the enqueue command
pub async fn run(ctx: &Context, args: EnqueueArgs) -> Result<()> {
    let raw = match (args.job, args.file) {
        (_, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (Some(job), None) => job,
        (None, None) => bail!("Provide the job JSON or --file"),
    };

    let payload = parse_payload(&raw)?;
    let new_job = ctx
        .settings
        .queue_config()?
        .new_job(payload.id, payload.command, payload.max_retries)?;

    let store = ctx.store().await?;
    match store.submit(new_job).await {
        Ok(job) => {
            print_success(&format!(
                "Enqueued job '{}' (max retries: {})",
                job.id, job.max_retries
            ));
            Ok(())
        }
        Err(QueueError::DuplicateId(id)) => bail!("Job '{}' already exists", id),
        Err(e) => Err(e.into()),
    }
}
