//! Exponential retry backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::QueueError;

pub const MIN_BACKOFF_BASE: u32 = 1;
pub const MAX_BACKOFF_BASE: u32 = 10;

/// `delay(attempts) = base ^ attempts` seconds. No jitter and no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    base: u32,
}

impl BackoffPolicy {
    pub fn new(base: u32) -> Result<Self, QueueError> {
        if !(MIN_BACKOFF_BASE..=MAX_BACKOFF_BASE).contains(&base) {
            return Err(QueueError::Config(format!(
                "backoff_base must be between {MIN_BACKOFF_BASE} and {MAX_BACKOFF_BASE}, got {base}"
            )));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Delay before the retry that follows the `attempts`-th execution.
    pub fn delay(&self, attempts: u32) -> Duration {
        Duration::from_secs(u64::from(self.base).saturating_pow(attempts))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base: 2 }
    }
}
