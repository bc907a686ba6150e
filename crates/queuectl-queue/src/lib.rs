//! # queuectl queue engine
//!
//! Job lifecycle and concurrency-safe queue core for queuectl.
//!
//! Features:
//! - Durable job record model with an explicit state machine
//! - `JobStore` trait with an atomic claim (in-memory here, SQLite in `queuectl-persist`)
//! - Shell executor with a hard wall-clock timeout
//! - Worker loop with exponential backoff and cooperative shutdown
//! - Process-per-worker pool manager
//! - Dead letter queue inspection and requeue

pub mod backend;
pub mod backoff;
pub mod config;
pub mod dlq;
pub mod error;
pub mod executor;
pub mod job;
pub mod memory;
pub mod pool;
pub mod worker;

pub use backend::JobStore;
pub use backoff::BackoffPolicy;
pub use config::QueueConfig;
pub use dlq::DeadLetterQueue;
pub use error::QueueError;
pub use executor::{Executor, FailureReason, Outcome, ShellExecutor};
pub use job::{Job, JobId, JobState, NewJob, StateCounts};
pub use memory::MemoryJobStore;
pub use pool::{PoolError, ProcessTable, StopReport, WorkerPoolManager, WorkerSpawnSpec};
pub use worker::{JobReport, Worker, WorkerConfig, WorkerSummary};
