//! Filesystem locations for taskminder.
//!
//! Platform defaults come from the [`dirs`] crate:
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (database, logs) | `~/Library/Application Support/taskminder/` | `~/.local/share/taskminder/` |
//! | Config | `~/Library/Application Support/taskminder/` | `~/.config/taskminder/` |
//!
//! # Environment Overrides
//!
//! - `TASKMINDER_DATA_DIR` overrides [`data_dir`]
//! - `TASKMINDER_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Environment variable overriding [`data_dir`].
pub const DATA_DIR_ENV: &str = "TASKMINDER_DATA_DIR";
/// Environment variable overriding [`config_dir`].
pub const CONFIG_DIR_ENV: &str = "TASKMINDER_CONFIG_DIR";

/// Application data root: the task database and logs live here.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(override_dir);
    }
    ::dirs::data_dir()
        .map(|d| d.join("taskminder"))
        .unwrap_or_else(|| PathBuf::from("/tmp/taskminder-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(override_dir);
    }
    ::dirs::config_dir()
        .map(|d| d.join("taskminder"))
        .unwrap_or_else(|| PathBuf::from("/tmp/taskminder-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default task database path (`data_dir()/tasks.db`).
#[must_use]
pub fn database_file() -> PathBuf {
    data_dir().join("tasks.db")
}
