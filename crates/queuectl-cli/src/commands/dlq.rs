//! DLQ command - inspect and requeue dead jobs
//!
//! Usage:
//! ```bash
//! queuectl dlq list
//! queuectl dlq retry job1
//! queuectl dlq retry --all
//! ```

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::sync::Arc;

use queuectl_queue::{DeadLetterQueue, QueueError};

use super::job_table;
use crate::{print_info, print_success, Context};

/// Arguments for the dlq command
#[derive(Args)]
pub struct DlqArgs {
    #[command(subcommand)]
    command: DlqCommand,
}

#[derive(Subcommand)]
pub enum DlqCommand {
    /// List jobs in the dead letter queue
    #[command(name = "list")]
    List,

    /// Move a dead job back to pending
    #[command(name = "retry")]
    Retry {
        /// Job id
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,

        /// Requeue every dead job
        #[arg(long)]
        all: bool,
    },
}

/// Run the dlq command
pub async fn run(ctx: &Context, args: DlqArgs) -> Result<()> {
    let dlq = DeadLetterQueue::new(Arc::new(ctx.store().await?));

    match args.command {
        DlqCommand::List => {
            let jobs = dlq.list_dead().await?;
            if jobs.is_empty() {
                print_info("Dead letter queue is empty");
                return Ok(());
            }
            println!("{}", format!("☠ Dead letter queue ({})", jobs.len()).bold().red());
            println!();
            println!("{}", job_table(&jobs));
            println!();
            println!("Requeue a job: {}", "queuectl dlq retry <id>".green());
        }
        DlqCommand::Retry { all: true, .. } => {
            let moved = dlq.retry_all().await?;
            if moved == 0 {
                print_info("Dead letter queue is empty");
            } else {
                print_success(&format!("Requeued {} job(s)", moved));
            }
        }
        DlqCommand::Retry { id: Some(id), .. } => match dlq.retry(&id).await {
            Ok(job) => print_success(&format!("Job '{}' moved back to {}", job.id, job.state)),
            Err(QueueError::NotFound(_)) => bail!("No dead job with id '{}'", id),
            Err(e) => return Err(e.into()),
        },
        DlqCommand::Retry { id: None, all: false } => bail!("Provide a job id or --all"),
    }
    Ok(())
}
