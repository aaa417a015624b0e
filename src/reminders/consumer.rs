//! Consumer side of the reminder queue.
//!
//! Everything here runs on the single consumer thread. Messages are only
//! hints: the task is re-read from the store before anything is shown, and
//! every store mutation driven by a reminder happens here rather than in a
//! scheduler callback.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime};
use tracing::{debug, info, warn};

use super::queue::{ReminderMessage, ReminderReceiver};
use crate::error::Result;
use crate::recurrence::{ResetOutcome, evaluate};
use crate::scheduler::Clock;
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus, format_timestamp};

/// Where reminders are shown.
pub trait ReminderPresenter {
    /// Show a reminder for `task`, which was re-read after `message` was dequeued.
    fn present(&mut self, task: &Task, message: &ReminderMessage);
}

/// Counters from one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Messages taken off the queue.
    pub received: usize,
    /// Reminders handed to the presenter.
    pub presented: usize,
    /// Messages dropped because the task was gone, completed, or disarmed.
    pub stale: usize,
    /// Messages dropped because the store could not be read or written.
    pub failed: usize,
}

/// Drain the queue and present every reminder that is still due.
///
/// A presented task has its reminder disarmed so a duplicate message for
/// the same due time is dropped as stale. A recurring task whose period
/// rolled over by the message's fire date is reset and re-armed first, so
/// the outcome does not depend on whether the periodic reset pass has run
/// yet.
pub fn poll_reminders(
    receiver: &ReminderReceiver,
    store: &dyn TaskStore,
    presenter: &mut dyn ReminderPresenter,
) -> PollSummary {
    let mut summary = PollSummary::default();

    for message in receiver.drain() {
        summary.received += 1;
        let loaded = store
            .load_by_id(message.task_id)
            .map(|task| task.map(|t| roll_over(t, &message)));
        let mut task = match loaded {
            Ok(Some(task)) if task.is_reminder_due() => task,
            Ok(Some(_)) => {
                summary.stale += 1;
                debug!(task_id = message.task_id, "reminder no longer due, dropping");
                continue;
            }
            Ok(None) => {
                summary.stale += 1;
                debug!(task_id = message.task_id, "task deleted, dropping reminder");
                continue;
            }
            Err(e) => {
                summary.failed += 1;
                warn!(task_id = message.task_id, "cannot load task for reminder: {e}");
                continue;
            }
        };

        presenter.present(&task, &message);
        summary.presented += 1;

        task.disarm_reminder();
        if let Err(e) = store.update(&task) {
            summary.failed += 1;
            warn!(task_id = task.id, "cannot disarm presented reminder: {e}");
        }
    }

    summary
}

/// Apply a recurrence reset that is due as of the message's fire date.
fn roll_over(mut task: Task, message: &ReminderMessage) -> Task {
    if let ResetOutcome::Reset(mutation) = evaluate(&task, message.fired_at.date()) {
        let old_status = mutation.apply(&mut task);
        task.arm_reminder();
        debug!(
            task_id = task.id,
            "new period before reset pass: {old_status} -> {}",
            task.status
        );
    }
    task
}

/// User responses to a shown reminder.
///
/// Each action re-reads the task, mutates it and writes it back. `Ok(false)`
/// means the task no longer exists.
pub struct ReminderActions {
    store: Arc<dyn TaskStore>,
    clock: Clock,
}

impl ReminderActions {
    /// Actions over `store`, using the local wall clock.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Override the clock used when a task has no usable due time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Mark the task completed and disarm its reminder.
    pub fn on_complete(&self, task_id: i64) -> Result<bool> {
        self.modify(task_id, "completed", |task| {
            task.status = TaskStatus::Completed;
            task.disarm_reminder();
        })
    }

    /// Dismiss the reminder without changing the task's status.
    pub fn on_skip(&self, task_id: i64) -> Result<bool> {
        self.modify(task_id, "skipped", Task::disarm_reminder)
    }

    /// Shift the due time by `minutes_delta` and re-arm the reminder.
    ///
    /// The shift starts from the current due time, or from now when the
    /// task has none or it cannot be parsed.
    pub fn on_reschedule(&self, task_id: i64, minutes_delta: i64) -> Result<bool> {
        let now = (self.clock)();
        self.modify(task_id, "rescheduled", |task| {
            let base = base_due(task, now);
            task.due_at = Some(format_timestamp(base + Duration::minutes(minutes_delta)));
            task.arm_reminder();
        })
    }

    fn modify(&self, task_id: i64, action: &str, change: impl FnOnce(&mut Task)) -> Result<bool> {
        let Some(mut task) = self.store.load_by_id(task_id)? else {
            debug!(task_id, "{action}: task no longer exists");
            return Ok(false);
        };
        change(&mut task);
        let updated = self.store.update(&task)?;
        if updated {
            info!(task_id, due = task.due_at.as_deref().unwrap_or("-"), "reminder {action}");
        }
        Ok(updated)
    }
}

fn base_due(task: &Task, now: NaiveDateTime) -> NaiveDateTime {
    match task.due_timestamp() {
        Ok(Some(due)) => due,
        Ok(None) => now,
        Err(e) => {
            warn!(task_id = task.id, "rescheduling from now: {e}");
            now
        }
    }
}
