//! Persistent task storage.
//!
//! [`TaskStore`] is the seam the engine consumes; [`SqliteTaskStore`] is the
//! shipped implementation.

pub(crate) mod schema;
pub mod sqlite;

pub use sqlite::SqliteTaskStore;

use crate::error::Result;
use crate::task::Task;

/// Load/save/delete operations over the task table.
///
/// Every call is independently atomic. Failures are returned rather than
/// panicking so callers can log and carry on.
pub trait TaskStore: Send + Sync {
    /// All tasks, ordered by id.
    fn load_all(&self) -> Result<Vec<Task>>;

    /// One task, or `None` when it no longer exists.
    fn load_by_id(&self, id: i64) -> Result<Option<Task>>;

    /// Insert a new task and return its assigned id.
    fn save(&self, task: &Task) -> Result<i64>;

    /// Overwrite the row for `task.id`. Returns `false` when no such row exists.
    fn update(&self, task: &Task) -> Result<bool>;

    /// Delete a task. Returns `false` when no such row exists.
    fn delete(&self, id: i64) -> Result<bool>;
}
