//! Task record and its enums.
//!
//! A [`Task`] keeps its due timestamp and last-reset date as the raw text
//! the store holds. Both are parsed on use so a single malformed row can be
//! skipped without poisoning a whole load.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskminderError};

/// How often a task repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Repetition {
    /// One-off task.
    #[default]
    None,
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// Once per calendar month.
    Monthly,
    /// Once per calendar year.
    Yearly,
    /// A stored label the engine does not recognise.
    Other(String),
}

impl Repetition {
    /// Parse a stored label. Unknown labels are preserved in [`Repetition::Other`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Self::None,
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            _ => Self::Other(label.trim().to_owned()),
        }
    }

    /// Storage label.
    pub fn as_label(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Other(label) => label,
        }
    }

    /// Returns `true` for the four recurring variants.
    pub fn is_recurring(&self) -> bool {
        matches!(
            self,
            Self::Daily | Self::Weekly | Self::Monthly | Self::Yearly
        )
    }
}

impl std::fmt::Display for Repetition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

impl std::str::FromStr for Repetition {
    type Err = TaskminderError;

    /// Strict parse used for user input: unknown labels are rejected.
    fn from_str(s: &str) -> Result<Self> {
        match Self::from_label(s) {
            Self::Other(label) => Err(TaskminderError::UnknownRepetition(label)),
            known => Ok(known),
        }
    }
}

impl From<String> for Repetition {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<Repetition> for String {
    fn from(r: Repetition) -> Self {
        r.as_label().to_owned()
    }
}

/// Task status. Only `Completed` carries meaning for the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TaskStatus {
    /// Not yet done.
    #[default]
    Pending,
    /// Done.
    Completed,
    /// User-defined status, kept verbatim.
    Other(String),
}

impl TaskStatus {
    /// Parse a stored label.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            _ => Self::Other(label.trim().to_owned()),
        }
    }

    /// Storage label.
    pub fn as_label(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Other(label) => label,
        }
    }

    /// Returns `true` for [`TaskStatus::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

impl From<String> for TaskStatus {
    fn from(label: String) -> Self {
        Self::from_label(&label)
    }
}

impl From<TaskStatus> for String {
    fn from(s: TaskStatus) -> Self {
        s.as_label().to_owned()
    }
}

/// A user task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Store-assigned identity; `0` before the first save.
    pub id: i64,
    /// Short title (non-empty).
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Expected duration in minutes.
    #[serde(default)]
    pub duration_minutes: u32,
    /// When the task was created. Never touched by recurrence logic.
    pub created_at: NaiveDateTime,
    /// Recurrence rule.
    #[serde(default)]
    pub repetition: Repetition,
    /// Priority ordinal (1 = highest).
    pub priority: u8,
    /// Free-text category.
    #[serde(default)]
    pub category: String,
    /// Raw ISO-8601 local due timestamp. `None` disables reminders.
    #[serde(default)]
    pub due_at: Option<String>,
    /// Current status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Raw `YYYY-MM-DD` date of the last recurrence reset.
    #[serde(default)]
    pub last_reset_date: Option<String>,
    /// Whether a reminder should still be shown for the current due time.
    #[serde(default)]
    pub reminder_armed: bool,
}

impl Task {
    /// Create an unsaved pending task created now, last reset today.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Local::now().naive_local();
        Self {
            id: 0,
            title: title.into(),
            description: String::new(),
            duration_minutes: 0,
            created_at: now,
            repetition: Repetition::None,
            priority: 1,
            category: String::new(),
            due_at: None,
            status: TaskStatus::Pending,
            last_reset_date: Some(format_date(now.date())),
            reminder_armed: true,
        }
    }

    /// Set the recurrence rule.
    pub fn with_repetition(mut self, repetition: Repetition) -> Self {
        self.repetition = repetition;
        self
    }

    /// Set the due timestamp.
    pub fn with_due(mut self, due: NaiveDateTime) -> Self {
        self.due_at = Some(format_timestamp(due));
        self
    }

    /// Set the last-reset date.
    pub fn with_last_reset(mut self, date: NaiveDate) -> Self {
        self.last_reset_date = Some(format_date(date));
        self
    }

    /// Reject tasks the store must not persist.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(TaskminderError::InvalidTask("title must not be empty".into()));
        }
        if self.priority == 0 {
            return Err(TaskminderError::InvalidTask("priority must be at least 1".into()));
        }
        Ok(())
    }

    /// Parsed due timestamp.
    ///
    /// `Ok(None)` when no due time is set; an error when the stored text is
    /// not a valid timestamp.
    pub fn due_timestamp(&self) -> Result<Option<NaiveDateTime>> {
        match self.due_at.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| TaskminderError::MalformedTaskState {
                    task_id: self.id,
                    detail: format!("unparseable due timestamp {raw:?}"),
                }),
        }
    }

    /// Parsed last-reset date. Absent and malformed are both errors.
    pub fn last_reset(&self) -> Result<NaiveDate> {
        let raw = self
            .last_reset_date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TaskminderError::MalformedTaskState {
                task_id: self.id,
                detail: "missing last reset date".to_owned(),
            })?;
        parse_date(raw).ok_or_else(|| TaskminderError::MalformedTaskState {
            task_id: self.id,
            detail: format!("unparseable last reset date {raw:?}"),
        })
    }

    /// Whether the consumer should present a reminder for this task now.
    pub fn is_reminder_due(&self) -> bool {
        self.reminder_armed
            && !self.status.is_completed()
            && matches!(self.due_timestamp(), Ok(Some(_)))
    }

    /// Mark the reminder as shown or skipped.
    pub fn disarm_reminder(&mut self) {
        self.reminder_armed = false;
    }

    /// Mark the reminder as pending again.
    pub fn arm_reminder(&mut self) {
        self.reminder_armed = true;
    }
}

/// Parse a local wall-clock timestamp.
///
/// Accepts `YYYY-MM-DDTHH:MM[:SS[.fff]]` with `T` or a space, and RFC 3339
/// strings with an offset (the local part is kept, the offset dropped).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 6] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Canonical timestamp text written to the store.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Canonical date text written to the store.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn new_task_defaults() {
        let task = Task::new("Water plants");
        assert_eq!(task.id, 0);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.repetition, Repetition::None);
        assert!(task.reminder_armed);
        assert_eq!(task.last_reset().unwrap(), task.created_at.date());
    }

    #[test]
    fn repetition_labels_are_case_insensitive() {
        assert_eq!(Repetition::from_label("Weekly"), Repetition::Weekly);
        assert_eq!(Repetition::from_label(""), Repetition::None);
        assert_eq!(
            Repetition::from_label("fortnightly"),
            Repetition::Other("fortnightly".to_owned())
        );
    }

    #[test]
    fn strict_repetition_parse_rejects_unknown() {
        let err = "hourly".parse::<Repetition>().unwrap_err();
        assert!(matches!(err, TaskminderError::UnknownRepetition(_)));
        assert_eq!("monthly".parse::<Repetition>().unwrap(), Repetition::Monthly);
    }

    #[test]
    fn status_keeps_custom_labels() {
        assert_eq!(TaskStatus::from_label("COMPLETED"), TaskStatus::Completed);
        let custom = TaskStatus::from_label("Waiting on Bob");
        assert_eq!(custom.as_label(), "Waiting on Bob");
        assert!(!custom.is_completed());
    }

    #[test]
    fn parse_timestamp_accepts_common_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-05-01T09:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 09:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T09:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T09:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("not-a-date"), None);
    }

    #[test]
    fn due_timestamp_reports_malformed_text() {
        let mut task = Task::new("t");
        task.id = 7;
        task.due_at = Some("tomorrow-ish".to_owned());
        let err = task.due_timestamp().unwrap_err();
        assert!(matches!(err, TaskminderError::MalformedTaskState { task_id: 7, .. }));

        task.due_at = Some("  ".to_owned());
        assert_eq!(task.due_timestamp().unwrap(), None);
    }

    #[test]
    fn last_reset_missing_is_an_error() {
        let mut task = Task::new("t");
        task.last_reset_date = None;
        assert!(task.last_reset().is_err());
        task.last_reset_date = Some("2024-02-30".to_owned());
        assert!(task.last_reset().is_err());
    }

    #[test]
    fn reminder_due_requires_armed_pending_and_due() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut task = Task::new("t").with_due(due);
        assert!(task.is_reminder_due());

        task.disarm_reminder();
        assert!(!task.is_reminder_due());

        task.arm_reminder();
        task.status = TaskStatus::Completed;
        assert!(!task.is_reminder_due());
    }

    #[test]
    fn validate_rejects_blank_title() {
        assert!(Task::new("   ").validate().is_err());
        assert!(Task::new("ok").validate().is_ok());
    }

    #[test]
    fn task_serde_round_trip_keeps_unknown_labels() {
        let mut task = Task::new("t").with_repetition(Repetition::Other("biweekly".into()));
        task.status = TaskStatus::Other("blocked".into());
        let json = serde_json::to_string(&task).unwrap();
        let restored: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, task);
    }
}
