//! Background job scheduler.
//!
//! [`JobScheduler`] is the capability the reminder reconciler is handed;
//! [`BackgroundScheduler`] is the tokio-driven implementation the runtime
//! starts. Jobs live in memory only and are rebuilt from the task table on
//! every start.

pub mod runner;
pub mod triggers;

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::error::Result;

pub use runner::{BackgroundScheduler, Clock};
pub use triggers::{CronSpec, TriggerSpec};

/// Callback invoked when a job fires. Runs on a scheduler worker thread.
pub type JobCallback = Arc<dyn Fn() + Send + Sync>;

/// Public view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Unique identifier (e.g. `"reminder_42"`).
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// When the job fires.
    pub trigger: TriggerSpec,
    /// Next planned fire time.
    pub next_run: Option<NaiveDateTime>,
}

/// Operations the reconciler and runtime need from a job scheduler.
pub trait JobScheduler: Send + Sync {
    /// Look up one job.
    fn get_job(&self, id: &str) -> Option<Job>;

    /// Register a job, atomically replacing any job with the same id.
    fn add_job(
        &self,
        id: &str,
        name: &str,
        trigger: TriggerSpec,
        callback: JobCallback,
    ) -> Result<()>;

    /// All registered jobs.
    fn list_jobs(&self) -> Result<Vec<Job>>;

    /// Remove a job. Returns `false` when no job had that id.
    fn remove_job(&self, id: &str) -> Result<bool>;

    /// Whether the scheduler loop is running.
    fn is_running(&self) -> bool;
}
