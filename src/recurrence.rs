//! Recurrence reset evaluation.
//!
//! [`evaluate`] is a pure decision over a task and a calendar date. The
//! periodic [`run_reset_pass`] applies the resulting mutations through the
//! task store one row at a time.

use chrono::{Datelike, Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::TaskStore;
use crate::task::{Repetition, Task, TaskStatus, format_date};

/// The mutation applied when a repeating task rolls over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetMutation {
    /// New status (always `Pending`).
    pub status: TaskStatus,
    /// New last-reset date.
    pub last_reset_date: NaiveDate,
}

impl ResetMutation {
    fn for_today(today: NaiveDate) -> Self {
        Self {
            status: TaskStatus::Pending,
            last_reset_date: today,
        }
    }

    /// Apply to `task`, returning the status it had before.
    pub fn apply(&self, task: &mut Task) -> TaskStatus {
        task.last_reset_date = Some(format_date(self.last_reset_date));
        std::mem::replace(&mut task.status, self.status.clone())
    }
}

/// Result of evaluating one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The recurrence window rolled over.
    Reset(ResetMutation),
    /// Recurring, but not yet due.
    NotDue,
    /// `Repetition::None`.
    NotRecurring,
    /// Repetition label the evaluator does not handle.
    UnknownRepetition(String),
    /// Last-reset date absent or malformed.
    SkippedInvalidState(String),
}

impl ResetOutcome {
    /// The mutation, if the reset fires.
    pub fn mutation(&self) -> Option<&ResetMutation> {
        match self {
            Self::Reset(m) => Some(m),
            _ => None,
        }
    }
}

/// Decide whether `task` is due for a recurrence reset on `today`.
pub fn evaluate(task: &Task, today: NaiveDate) -> ResetOutcome {
    let last = match &task.repetition {
        Repetition::None => return ResetOutcome::NotRecurring,
        Repetition::Other(label) => return ResetOutcome::UnknownRepetition(label.clone()),
        _ => match task.last_reset() {
            Ok(date) => date,
            Err(e) => return ResetOutcome::SkippedInvalidState(e.to_string()),
        },
    };

    if window_rolled_over(&task.repetition, last, today) {
        ResetOutcome::Reset(ResetMutation::for_today(today))
    } else {
        ResetOutcome::NotDue
    }
}

fn window_rolled_over(repetition: &Repetition, last: NaiveDate, today: NaiveDate) -> bool {
    match repetition {
        Repetition::Daily => today > last,
        Repetition::Weekly => today >= last + Duration::days(7),
        // Day-of-month is compared literally: a reset on the 31st waits for
        // a month that has a 31st.
        Repetition::Monthly => {
            today > last
                && (today.month() != last.month() || today.year() != last.year())
                && today.day() >= last.day()
        }
        Repetition::Yearly => {
            today > last
                && today.year() > last.year()
                && (today.month() > last.month()
                    || (today.month() == last.month() && today.day() >= last.day()))
        }
        Repetition::None | Repetition::Other(_) => false,
    }
}

/// Counters from one reset pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    /// Tasks looked at.
    pub examined: usize,
    /// Tasks reset and persisted.
    pub reset: usize,
    /// Tasks skipped for invalid state or unknown repetition.
    pub skipped: usize,
    /// Resets whose store update failed.
    pub failed: usize,
}

/// Evaluate every stored task and persist the resets that fire.
///
/// A reset also re-arms the task's reminder for the new period.
///
/// Only a failure to load the task table aborts the pass; individual
/// update failures are logged and counted.
pub fn run_reset_pass(store: &dyn TaskStore, today: NaiveDate) -> Result<ResetSummary> {
    let tasks = store.load_all()?;
    let mut summary = ResetSummary {
        examined: tasks.len(),
        ..ResetSummary::default()
    };

    for mut task in tasks {
        match evaluate(&task, today) {
            ResetOutcome::Reset(mutation) => {
                let old_status = mutation.apply(&mut task);
                // A new period gets a fresh reminder.
                task.arm_reminder();
                match store.update(&task) {
                    Ok(true) => {
                        summary.reset += 1;
                        info!(
                            task_id = task.id,
                            repetition = %task.repetition,
                            "reset task: {old_status} -> {}",
                            task.status
                        );
                    }
                    Ok(false) => {
                        debug!(task_id = task.id, "task vanished before reset could be saved");
                    }
                    Err(e) => {
                        summary.failed += 1;
                        warn!(task_id = task.id, "cannot persist reset: {e}");
                    }
                }
            }
            ResetOutcome::SkippedInvalidState(reason) => {
                summary.skipped += 1;
                warn!(task_id = task.id, "skipping recurrence check: {reason}");
            }
            ResetOutcome::UnknownRepetition(label) => {
                summary.skipped += 1;
                warn!(task_id = task.id, "unknown repetition '{label}', skipping reset");
            }
            ResetOutcome::NotDue | ResetOutcome::NotRecurring => {}
        }
    }

    debug!(
        examined = summary.examined,
        reset = summary.reset,
        skipped = summary.skipped,
        failed = summary.failed,
        "reset pass finished"
    );
    Ok(summary)
}
