//! taskminder: personal tasks with recurring resets and scheduled reminders.
//!
//! # Architecture
//!
//! - **Store**: tasks persist in SQLite behind the [`store::TaskStore`] trait
//! - **Recurrence**: [`recurrence`] decides when a repeating task reopens
//! - **Scheduler**: [`scheduler::BackgroundScheduler`] fires jobs on a tokio loop
//! - **Reminders**: [`reminders`] keeps one scheduler job per due task and
//!   hands fired reminders to a single consumer over a queue
//! - **Runtime**: [`runtime::Runtime`] wires the pieces and runs the periodic
//!   reset and reconcile passes

pub mod app_dirs;
pub mod config;
pub mod error;
pub mod logging;
pub mod recurrence;
pub mod reminders;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod task;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::AppConfig;
pub use error::{Result, TaskminderError};
pub use runtime::Runtime;
pub use store::{SqliteTaskStore, TaskStore};
pub use task::{Repetition, Task, TaskStatus};
