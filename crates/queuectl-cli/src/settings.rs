//! Settings file and on-disk locations
//!
//! Layering: built-in defaults, then `~/.queuectl/config.json`, then
//! `QUEUECTL_*` environment variables.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use queuectl_queue::QueueConfig;

/// Keys accepted by `config get/set`, as typed on the command line.
pub const KEYS: [&str; 4] = ["max-retries", "backoff-base", "job-timeout", "poll-interval-ms"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_retries: u32,
    pub backoff_base: u32,
    pub job_timeout_secs: u64,
    pub poll_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = QueueConfig::default();
        Self {
            max_retries: defaults.max_retries,
            backoff_base: defaults.backoff_base,
            job_timeout_secs: defaults.job_timeout_secs,
            poll_interval_ms: defaults.poll_interval_ms,
            db_path: None,
        }
    }
}

impl Settings {
    pub fn load(home: &Path) -> Result<Self> {
        Self::layered(home, true)
    }

    /// Defaults and the JSON file only.
    pub fn load_file(home: &Path) -> Result<Self> {
        Self::layered(home, false)
    }

    fn layered(home: &Path, with_env: bool) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            File::from(config_file(home).as_path())
                .format(FileFormat::Json)
                .required(false),
        );
        if with_env {
            builder = builder.add_source(Environment::with_prefix("QUEUECTL").try_parsing(true));
        }
        builder
            .build()
            .context("Failed to read queuectl configuration")?
            .try_deserialize()
            .context("Invalid queuectl configuration")
    }

    /// Validated engine defaults.
    pub fn queue_config(&self) -> Result<QueueConfig> {
        let config = QueueConfig {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            job_timeout_secs: self.job_timeout_secs,
            poll_interval_ms: self.poll_interval_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn get(&self, key: &str) -> Result<String> {
        Ok(match key {
            "max-retries" => self.max_retries.to_string(),
            "backoff-base" => self.backoff_base.to_string(),
            "job-timeout" => self.job_timeout_secs.to_string(),
            "poll-interval-ms" => self.poll_interval_ms.to_string(),
            other => bail!("Unknown configuration key '{other}' (expected one of: {})", KEYS.join(", ")),
        })
    }

    /// Apply one change, rejecting values the engine would refuse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let number: u64 = value
            .parse()
            .with_context(|| format!("'{value}' is not a valid non-negative integer"))?;
        let small = || u32::try_from(number).with_context(|| format!("'{value}' is out of range"));

        let mut next = self.clone();
        match key {
            "max-retries" => next.max_retries = small()?,
            "backoff-base" => next.backoff_base = small()?,
            "job-timeout" => next.job_timeout_secs = number,
            "poll-interval-ms" => next.poll_interval_ms = number,
            other => bail!("Unknown configuration key '{other}' (expected one of: {})", KEYS.join(", ")),
        }
        next.queue_config()?;
        *self = next;
        Ok(())
    }

    /// Write the file layer back, leaving unrelated keys in place.
    pub fn save(&self, home: &Path) -> Result<()> {
        let path = config_file(home);
        let mut doc = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&text)
                .unwrap_or_default(),
            Err(_) => serde_json::Map::new(),
        };
        if let serde_json::Value::Object(ours) = serde_json::to_value(self)? {
            doc.extend(ours);
        }

        std::fs::create_dir_all(home)
            .with_context(|| format!("Failed to create {}", home.display()))?;
        std::fs::write(&path, serde_json::to_string_pretty(&doc)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// `$QUEUECTL_HOME`, or `~/.queuectl`.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("QUEUECTL_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not determine the home directory")?;
    Ok(home.join(".queuectl"))
}

pub fn config_file(home: &Path) -> PathBuf {
    home.join("config.json")
}

pub fn pid_file(home: &Path) -> PathBuf {
    home.join("workers.pid")
}

pub fn worker_log(home: &Path) -> PathBuf {
    home.join("workers.log")
}
