//! Error types for the task and reminder engine.

/// Top-level error type for taskminder.
#[derive(Debug, thiserror::Error)]
pub enum TaskminderError {
    /// The task store could not be opened, read, or written.
    #[error("task store unavailable: {0}")]
    StoreUnavailable(String),

    /// A task carries a date or timestamp field that cannot be parsed.
    #[error("malformed state on task {task_id}: {detail}")]
    MalformedTaskState {
        /// Identity of the offending task.
        task_id: i64,
        /// What failed to parse.
        detail: String,
    },

    /// A repetition label the engine does not know how to handle.
    #[error("unknown repetition value: {0}")]
    UnknownRepetition(String),

    /// The job scheduler rejected an add or remove.
    #[error("job registration failed: {0}")]
    JobRegistration(String),

    /// The job scheduler is stopped or its job set cannot be read.
    #[error("scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    /// Handing a reminder to the consumer queue failed.
    #[error("reminder queue hand-off failed: {0}")]
    QueueHandoff(String),

    /// A task failed validation before being persisted.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TaskminderError>;

impl From<rusqlite::Error> for TaskminderError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}
