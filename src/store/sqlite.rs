//! SQLite-backed task store.
//!
//! A single database file holds the `tasks` table. Enum columns are stored
//! as their lowercase labels so unknown values survive a round trip.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use super::TaskStore;
use super::schema::{apply_schema, read_schema_version};
use crate::error::{Result, TaskminderError};
use crate::task::{Repetition, Task, TaskStatus, parse_timestamp};

const SELECT_COLUMNS: &str = "SELECT id, title, description, duration_minutes, created_at, \
     repetition, priority, category, due_at, status, last_reset_date, reminder_armed \
     FROM tasks";

/// SQLite task store.
///
/// Thread-safe via an internal `Mutex<Connection>`; each trait call takes
/// the lock for its whole statement, so writes are atomic per row.
pub struct SqliteTaskStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        debug!("opened task store at {}", path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version stamp.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TaskminderError::StoreUnavailable(format!("lock poisoned: {e}")))
    }
}

impl TaskStore for SqliteTaskStore {
    fn load_all(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let rows = stmt.query_map([], row_to_task)?;

        let mut tasks = Vec::new();
        for r in rows {
            tasks.push(r?);
        }
        Ok(tasks)
    }

    fn load_by_id(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn save(&self, task: &Task) -> Result<i64> {
        task.validate()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks \
             (title, description, duration_minutes, created_at, repetition, priority, \
              category, due_at, status, last_reset_date, reminder_armed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.title,
                task.description,
                task.duration_minutes,
                format_created(task.created_at),
                task.repetition.as_label(),
                task.priority,
                task.category,
                task.due_at,
                task.status.as_label(),
                task.last_reset_date,
                task.reminder_armed,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, task: &Task) -> Result<bool> {
        task.validate()?;
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, duration_minutes = ?3, \
             repetition = ?4, priority = ?5, category = ?6, due_at = ?7, status = ?8, \
             last_reset_date = ?9, reminder_armed = ?10 WHERE id = ?11",
            params![
                task.title,
                task.description,
                task.duration_minutes,
                task.repetition.as_label(),
                task.priority,
                task.category,
                task.due_at,
                task.status.as_label(),
                task.last_reset_date,
                task.reminder_armed,
                task.id,
            ],
        )?;
        Ok(rows > 0)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

fn format_created(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id: i64 = row.get(0)?;
    let created_raw: String = row.get(4)?;
    let repetition: String = row.get(5)?;
    let priority: i64 = row.get(6)?;
    let status: String = row.get(9)?;

    let created_at = parse_timestamp(&created_raw).unwrap_or_else(|| {
        warn!(task_id = id, "unparseable created_at {created_raw:?}");
        NaiveDateTime::default()
    });

    Ok(Task {
        id,
        title: row.get(1)?,
        description: row.get(2)?,
        duration_minutes: row.get(3)?,
        created_at,
        repetition: Repetition::from_label(&repetition),
        priority: u8::try_from(priority.clamp(1, i64::from(u8::MAX))).unwrap_or(1),
        category: row.get(7)?,
        due_at: row.get(8)?,
        status: TaskStatus::from_label(&status),
        last_reset_date: row.get(10)?,
        reminder_armed: row.get(11)?,
    })
}
