//! Worker pool manager: one OS process per worker
//!
//! Workers share nothing but the store. The manager only starts them, asks
//! them to stop (SIGTERM, which each worker turns into its cooperative
//! shutdown flag) and counts the ones still alive. PIDs are kept in a
//! [`ProcessTable`] so a later invocation can stop workers an earlier one
//! started.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker count must be at least 1")]
    InvalidCount,

    #[error("{} worker(s) are still finishing in-flight jobs: {:?}", .0.len(), .0)]
    StillRunning(Vec<u32>),

    #[error("Process table error: {0}")]
    Table(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// External bookkeeping of worker PIDs.
pub trait ProcessTable: Send + Sync {
    fn load(&self) -> Result<Vec<u32>, PoolError>;
    fn save(&self, pids: &[u32]) -> Result<(), PoolError>;
    fn clear(&self) -> Result<(), PoolError>;
}

/// How to launch one worker process.
#[derive(Debug, Clone)]
pub struct WorkerSpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// stdout/stderr of workers are appended here, or discarded when unset.
    pub log_file: Option<PathBuf>,
}

impl WorkerSpawnSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            log_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    fn command(&self) -> Result<Command, PoolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());

        match &self.log_file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                cmd.stdout(file.try_clone()?).stderr(file);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        // Own process group: a Ctrl+C in the launching terminal must not
        // bypass the cooperative shutdown path.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        Ok(cmd)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Live workers that were sent the shutdown signal
    pub signalled: usize,
    /// Workers confirmed gone when `stop` returned
    pub exited: usize,
    /// Workers still busy after the grace period; they stay recorded
    pub still_running: Vec<u32>,
}

pub struct WorkerPoolManager<T: ProcessTable> {
    table: T,
    spec: WorkerSpawnSpec,
    grace: Duration,
    /// Children spawned by this instance, kept so exits can be reaped.
    children: HashMap<u32, Child>,
}

impl<T: ProcessTable> WorkerPoolManager<T> {
    pub fn new(table: T, spec: WorkerSpawnSpec) -> Self {
        Self {
            table,
            spec,
            grace: Duration::from_secs(10),
            children: HashMap::new(),
        }
    }

    /// How long `stop` waits for workers to finish their current job.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Replace any recorded workers with `count` fresh ones.
    pub async fn start(&mut self, count: usize) -> Result<Vec<u32>, PoolError> {
        if count == 0 {
            return Err(PoolError::InvalidCount);
        }

        let report = self.stop().await?;
        if !report.still_running.is_empty() {
            return Err(PoolError::StillRunning(report.still_running));
        }

        let mut pids = Vec::with_capacity(count);
        for i in 0..count {
            let child = match self.spec.command().and_then(|mut c| Ok(c.spawn()?)) {
                Ok(child) => child,
                Err(e) => {
                    // Record what did start so it can still be stopped.
                    self.table.save(&pids)?;
                    return Err(e);
                }
            };
            let pid = child.id();
            debug!(pid, index = i, "Spawned worker process");
            self.children.insert(pid, child);
            pids.push(pid);
        }

        self.table.save(&pids)?;
        info!(count, ?pids, "Worker pool started");
        Ok(pids)
    }

    /// Ask every recorded worker to shut down and wait up to the grace period.
    /// Workers are never force-killed.
    pub async fn stop(&mut self) -> Result<StopReport, PoolError> {
        let recorded = self.table.load()?;
        let live: Vec<u32> = recorded.into_iter().filter(|&pid| self.is_alive(pid)).collect();

        let mut report = StopReport::default();
        for &pid in &live {
            match sys::terminate(pid) {
                Ok(()) => report.signalled += 1,
                Err(e) => warn!(pid, error = %e, "Failed to signal worker"),
            }
        }

        let deadline = Instant::now() + self.grace;
        let mut remaining = live;
        loop {
            remaining.retain(|&pid| self.is_alive(pid));
            if remaining.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        report.exited = report.signalled.saturating_sub(remaining.len());
        if remaining.is_empty() {
            self.table.clear()?;
        } else {
            warn!(pids = ?remaining, "Workers still running after grace period");
            self.table.save(&remaining)?;
        }
        report.still_running = remaining;
        info!(
            signalled = report.signalled,
            exited = report.exited,
            still_running = report.still_running.len(),
            "Worker pool stop requested"
        );
        Ok(report)
    }

    /// Recorded workers that are currently alive.
    pub fn status(&mut self) -> Result<usize, PoolError> {
        let recorded = self.table.load()?;
        Ok(recorded.into_iter().filter(|&pid| self.is_alive(pid)).count())
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        if let Some(child) = self.children.get_mut(&pid) {
            return match child.try_wait() {
                Ok(None) => true,
                Ok(Some(_)) | Err(_) => {
                    self.children.remove(&pid);
                    false
                }
            };
        }
        sys::is_alive(pid)
    }
}

#[cfg(unix)]
mod sys {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    fn pid(pid: u32) -> Option<Pid> {
        // 0 and negative values address process groups, never a single worker
        i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
    }

    pub fn terminate(raw: u32) -> std::io::Result<()> {
        let pid = pid(raw).ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
        kill(pid, Signal::SIGTERM).map_err(std::io::Error::from)
    }

    pub fn is_alive(raw: u32) -> bool {
        match pid(raw) {
            Some(pid) => {
                matches!(kill(pid, None), Ok(()) | Err(Errno::EPERM)) && !is_zombie(raw)
            }
            None => false,
        }
    }

    /// An exited worker whose parent never reaped it still answers `kill(pid, 0)`.
    #[cfg(target_os = "linux")]
    fn is_zombie(raw: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{raw}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.split_whitespace().next().map(|state| state == "Z")
            })
            .unwrap_or(false)
    }

    #[cfg(not(target_os = "linux"))]
    fn is_zombie(_raw: u32) -> bool {
        false
    }
}

#[cfg(not(unix))]
mod sys {
    pub fn terminate(_pid: u32) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }

    pub fn is_alive(_pid: u32) -> bool {
        false
    }
}
