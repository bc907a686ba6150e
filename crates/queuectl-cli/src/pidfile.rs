//! JSON PID file backing the worker pool's process table

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use queuectl_queue::{PoolError, ProcessTable};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PidDoc {
    pids: Vec<u32>,
}

/// `{"pids": [..]}` on disk. A missing or unreadable file means no workers.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProcessTable for PidFile {
    fn load(&self) -> Result<Vec<u32>, PoolError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str::<PidDoc>(&text)
                .map(|doc| doc.pids)
                .unwrap_or_else(|e| {
                    tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable PID file");
                    Vec::new()
                })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, pids: &[u32]) -> Result<(), PoolError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let doc = PidDoc { pids: pids.to_vec() };
        let text = serde_json::to_string(&doc).map_err(|e| PoolError::Table(e.to_string()))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PoolError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
