//! # queuectl persistence
//!
//! SQLite-backed [`JobStore`](queuectl_queue::JobStore). One database file is
//! shared by every worker process; the atomic claim lives in [`store`].

pub mod sqlite;
pub mod store;

pub use sqlite::{connect, SqliteConfig};
pub use store::SqliteJobStore;
