//! queuectl - single-machine background job queue
//!
//! # Usage
//!
//! ```bash
//! # Submit a job
//! queuectl enqueue '{"id":"job1","command":"sleep 2"}'
//!
//! # Run three worker processes, then stop them gracefully
//! queuectl worker start --count 3
//! queuectl worker stop
//!
//! # Inspect
//! queuectl status
//! queuectl list --state pending
//!
//! # Dead letter queue
//! queuectl dlq list
//! queuectl dlq retry job1
//!
//! # Defaults
//! queuectl config set max-retries 5
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;

mod commands;
mod pidfile;
mod settings;

use commands::{config, dlq, enqueue, list, status, worker};
use queuectl_persist::{SqliteConfig, SqliteJobStore};
use settings::Settings;

/// queuectl - background jobs with retries and a dead letter queue
#[derive(Parser)]
#[command(
    name = "queuectl",
    version,
    about = "queuectl - CLI background job queue",
    long_about = "queuectl runs shell commands as background jobs.\n\n\
                  Jobs are stored in SQLite, executed by worker processes,\n\
                  retried with exponential backoff and parked in a dead\n\
                  letter queue once their retries are exhausted."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the job database
    #[arg(long, env = "QUEUECTL_DB", global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job
    #[command(name = "enqueue")]
    Enqueue(enqueue::EnqueueArgs),

    /// Manage worker processes
    #[command(name = "worker")]
    Worker(worker::WorkerArgs),

    /// Show job counts by state and active workers
    #[command(name = "status")]
    Status,

    /// List jobs
    #[command(name = "list")]
    List(list::ListArgs),

    /// Dead letter queue
    #[command(name = "dlq")]
    Dlq(dlq::DlqArgs),

    /// Show or change queue defaults
    #[command(name = "config")]
    Config(config::ConfigArgs),
}

/// Shared state for one invocation
pub struct Context {
    pub home: PathBuf,
    pub settings: Settings,
    pub db_path: PathBuf,
    pub verbose: u8,
}

impl Context {
    /// `lenient` falls back to defaults when the settings file is unreadable,
    /// so `config` can still repair it.
    fn new(db: Option<PathBuf>, verbose: u8, lenient: bool) -> Result<Self> {
        let home = settings::home_dir()?;
        let settings = match Settings::load(&home) {
            Ok(settings) => settings,
            Err(e) if lenient => {
                print_warning(&format!("{:#}; using defaults", e));
                Settings::default()
            }
            Err(e) => return Err(e),
        };
        let db_path = db
            .or_else(|| settings.db_path.clone())
            .unwrap_or_else(|| home.join("queuectl.db"));
        Ok(Self {
            home,
            settings,
            db_path,
            verbose,
        })
    }

    /// Open (and migrate) the shared job database.
    pub async fn store(&self) -> Result<SqliteJobStore> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        SqliteJobStore::open(&SqliteConfig::file(&self.db_path))
            .await
            .with_context(|| format!("Failed to open job database {}", self.db_path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Worker processes log at info by default; they write to the worker log.
    let worker_run = matches!(
        &cli.command,
        Commands::Worker(args) if args.is_run()
    );
    setup_logging(if worker_run { cli.verbose.max(1) } else { cli.verbose });

    let lenient = matches!(cli.command, Commands::Config(_));
    let ctx = Context::new(cli.db, cli.verbose, lenient)?;

    let result = match cli.command {
        Commands::Enqueue(args) => enqueue::run(&ctx, args).await,
        Commands::Worker(args) => worker::run(&ctx, args).await,
        Commands::Status => status::run(&ctx).await,
        Commands::List(args) => list::run(&ctx, args).await,
        Commands::Dlq(args) => dlq::run(&ctx, args).await,
        Commands::Config(args) => config::run(&ctx, args),
    };

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(filter))
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message with an X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

/// Print an info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}
