//! Worker command - start, stop and run worker processes
//!
//! Usage:
//! ```bash
//! queuectl worker start --count 3
//! queuectl worker stop --grace-secs 30
//! ```

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use queuectl_queue::{ShellExecutor, Worker, WorkerConfig, WorkerPoolManager, WorkerSpawnSpec};

use crate::pidfile::PidFile;
use crate::settings::{pid_file, worker_log};
use crate::{print_info, print_success, print_warning, Context};

/// Arguments for the worker command
#[derive(Args)]
pub struct WorkerArgs {
    #[command(subcommand)]
    command: WorkerCommand,
}

impl WorkerArgs {
    pub fn is_run(&self) -> bool {
        matches!(self.command, WorkerCommand::Run)
    }
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Start worker processes in the background
    #[command(name = "start")]
    Start {
        /// Number of workers
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Stop running workers after they finish their current job
    #[command(name = "stop")]
    Stop {
        /// Seconds to wait for workers to exit
        #[arg(long, default_value_t = 10)]
        grace_secs: u64,
    },

    /// Run a single worker in the foreground
    #[command(name = "run", hide = true)]
    Run,
}

/// Run the worker command
pub async fn run(ctx: &Context, args: WorkerArgs) -> Result<()> {
    match args.command {
        WorkerCommand::Start { count } => start(ctx, count).await,
        WorkerCommand::Stop { grace_secs } => stop(ctx, Duration::from_secs(grace_secs)).await,
        WorkerCommand::Run => run_worker(ctx).await,
    }
}

pub(crate) fn pool_manager(ctx: &Context) -> Result<WorkerPoolManager<PidFile>> {
    let exe = std::env::current_exe().context("Failed to locate the queuectl executable")?;
    let mut spec = WorkerSpawnSpec::new(exe)
        .arg("--db")
        .arg(ctx.db_path.display().to_string())
        .with_log_file(worker_log(&ctx.home));
    for _ in 0..ctx.verbose {
        spec = spec.arg("-v");
    }
    spec = spec.arg("worker").arg("run");

    Ok(WorkerPoolManager::new(PidFile::new(pid_file(&ctx.home)), spec))
}

async fn start(ctx: &Context, count: usize) -> Result<()> {
    ctx.settings.queue_config()?;
    // Create and migrate the database once, before workers race to do it.
    ctx.store().await?.close().await;
    std::fs::create_dir_all(&ctx.home)
        .with_context(|| format!("Failed to create {}", ctx.home.display()))?;

    let pids = pool_manager(ctx)?.start(count).await?;

    print_success(&format!("Started {} worker(s)", pids.len()));
    let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
    println!("  PIDs: {}", pids.join(", ").cyan());
    println!("  Log:  {}", worker_log(&ctx.home).display().to_string().dimmed());
    Ok(())
}

async fn stop(ctx: &Context, grace: Duration) -> Result<()> {
    let report = pool_manager(ctx)?.with_grace(grace).stop().await?;

    if report.signalled == 0 {
        print_info("No workers running");
        return Ok(());
    }
    if report.exited > 0 {
        print_success(&format!("Stopped {} worker(s)", report.exited));
    }
    if !report.still_running.is_empty() {
        print_warning(&format!(
            "{} worker(s) still finishing their current job: {:?}",
            report.still_running.len(),
            report.still_running
        ));
        println!(
            "Run {} again once they are done.",
            "queuectl worker stop".green()
        );
    }
    Ok(())
}

async fn run_worker(ctx: &Context) -> Result<()> {
    let queue_config = ctx.settings.queue_config()?;
    let config = WorkerConfig::from_queue_config(format!("worker-{}", std::process::id()), &queue_config)?;
    let store = Arc::new(ctx.store().await?);
    let worker = Worker::new(store.clone(), Arc::new(ShellExecutor::new()), config);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    worker.run(rx).await;
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current job");
        },
        _ = terminate => {
            info!("Received SIGTERM, finishing current job");
        },
    }
}
