//! Configuration for taskminder.
//!
//! Loaded from `config.toml`; every section and field falls back to its
//! default, so a partial or empty file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskminderError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Task database settings.
    pub store: StoreConfig,
    /// Background scheduler cadence.
    pub scheduler: SchedulerConfig,
    /// Reminder consumer settings.
    pub reminders: RemindersConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Task database settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `None` uses `tasks.db` in the data directory.
    pub database_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Effective database path.
    pub fn resolved_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(crate::app_dirs::database_file)
    }
}

/// Background scheduler cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the scheduler checks for due jobs, in milliseconds.
    pub tick_interval_ms: u64,
    /// Seconds between recurrence reset passes.
    pub reset_interval_secs: u64,
    /// Seconds between reminder reconcile passes.
    pub reconcile_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            reset_interval_secs: 300,
            reconcile_interval_secs: 60,
        }
    }
}

impl SchedulerConfig {
    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Reminder consumer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    /// How often the consumer drains the reminder queue, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

impl RemindersConfig {
    /// Queue poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write a daily-rotated log file under the logs directory.
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "taskminder=info".to_owned(),
            file_enabled: false,
        }
    }
}

impl AppConfig {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.tick_interval_ms == 0 {
            return Err(TaskminderError::Config(
                "scheduler.tick_interval_ms must be positive".into(),
            ));
        }
        if s.reset_interval_secs == 0 || s.reconcile_interval_secs == 0 {
            return Err(TaskminderError::Config(
                "scheduler pass intervals must be at least one second".into(),
            ));
        }
        if self.reminders.poll_interval_ms == 0 {
            return Err(TaskminderError::Config(
                "reminders.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| TaskminderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TaskminderError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }

    /// Load `path`, or the defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}
