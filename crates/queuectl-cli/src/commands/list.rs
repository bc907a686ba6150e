//! List command - show jobs, optionally filtered by state
//!
//! Usage:
//! ```bash
//! queuectl list
//! queuectl list --state failed
//! ```

use anyhow::Result;
use clap::Args;

use queuectl_queue::{JobState, JobStore};

use super::job_table;
use crate::{print_info, Context};

/// Arguments for the list command
#[derive(Args)]
pub struct ListArgs {
    /// Only show jobs in this state (pending, processing, completed, failed, dead)
    #[arg(short, long)]
    state: Option<JobState>,
}

/// Run the list command
pub async fn run(ctx: &Context, args: ListArgs) -> Result<()> {
    let store = ctx.store().await?;
    let jobs = store.list(args.state).await?;

    if jobs.is_empty() {
        match args.state {
            Some(state) => print_info(&format!("No {} jobs", state)),
            None => print_info("No jobs"),
        }
        return Ok(());
    }

    println!("{}", job_table(&jobs));
    Ok(())
}
