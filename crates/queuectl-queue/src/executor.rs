//! Job Executor: runs one command to completion or timeout
//!
//! The executor never touches the store. It reports an [`Outcome`] and the
//! worker loop decides what that means for the job.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of one execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Exit code 0
    Success,
    Failure(FailureReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Nonzero exit code
    ExitCode(i32),
    /// Terminated by a signal before exiting
    Signaled,
    /// Killed after exceeding the wall-clock limit
    TimedOut(Duration),
    /// Could not be started at all
    Spawn(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExitCode(code) => write!(f, "exit code {code}"),
            FailureReason::Signaled => f.write_str("terminated by signal"),
            FailureReason::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
            FailureReason::Spawn(e) => write!(f, "spawn failed: {e}"),
        }
    }
}

/// Runs a job's command.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Outcome;
}

/// Runs commands through the platform shell as isolated child processes.
/// Output is discarded; only the exit status matters.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn command(command: &str) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // The job leads its own group so a timeout can take down everything it forked.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// SIGKILL the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()).filter(|p| *p > 0) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!(pgid, error = %e, "Failed to kill job process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, command: &str, timeout: Duration) -> Outcome {
        let start = Instant::now();
        let mut child = match Self::command(command).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "Failed to spawn job command");
                return Outcome::Failure(FailureReason::Spawn(e.to_string()));
            }
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(
                    command,
                    status = %status,
                    execution_ms = start.elapsed().as_millis(),
                    "Job command exited"
                );
                if status.success() {
                    Outcome::Success
                } else {
                    match status.code() {
                        Some(code) => Outcome::Failure(FailureReason::ExitCode(code)),
                        None => Outcome::Failure(FailureReason::Signaled),
                    }
                }
            }
            Ok(Err(e)) => Outcome::Failure(FailureReason::Spawn(e.to_string())),
            Err(_) => {
                warn!(
                    command,
                    timeout_secs = timeout.as_secs(),
                    "Job command timed out, killing"
                );
                kill_group(child.id());
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out job command");
                }
                Outcome::Failure(FailureReason::TimedOut(timeout))
            }
        }
    }
}
