//! Reminder job reconciliation.
//!
//! Computes the reminder jobs the task table calls for and brings the
//! scheduler's `reminder_*` namespace in line: missing jobs are added,
//! changed ones replaced, orphans removed. Jobs outside the namespace are
//! never touched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use tracing::{debug, info, warn};

use super::queue::ReminderSender;
use crate::error::{Result, TaskminderError};
use crate::scheduler::{Clock, CronSpec, Job, JobCallback, JobScheduler, TriggerSpec};
use crate::store::TaskStore;
use crate::task::{Repetition, Task};

/// Identifier prefix owned by the reconciler.
pub const REMINDER_JOB_PREFIX: &str = "reminder_";

/// Scheduler job identifier for a task's reminder.
pub fn reminder_job_id(task_id: i64) -> String {
    format!("{REMINDER_JOB_PREFIX}{task_id}")
}

/// Counters from one reconcile cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Jobs newly registered.
    pub scheduled: usize,
    /// Jobs re-registered because the schedule or title changed.
    pub updated: usize,
    /// Orphaned reminder jobs removed.
    pub removed_stale: usize,
    /// Tasks excluded for a past, malformed, or unsupported due time.
    pub skipped: usize,
    /// Registrations the scheduler rejected.
    pub failed: usize,
}

impl ReconcileSummary {
    /// Whether the cycle changed the job set.
    pub fn changed(&self) -> bool {
        self.scheduled + self.updated + self.removed_stale > 0
    }
}

#[derive(Debug)]
struct DesiredJob {
    task_id: i64,
    title: String,
    trigger: TriggerSpec,
}

/// Builds reminder jobs whose callbacks feed the reminder queue.
#[derive(Clone)]
pub struct Reconciler {
    queue: ReminderSender,
    clock: Clock,
}

impl Reconciler {
    /// Create a reconciler whose jobs enqueue into `queue`, stamping
    /// messages with the local wall clock.
    pub fn new(queue: ReminderSender) -> Self {
        Self {
            queue,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Stamp fired reminders with `clock`, normally the scheduler's own.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Trigger a task's reminder should use at `now`, if any.
    ///
    /// Completed tasks, tasks without a due time, one-shots already in the
    /// past and unknown repetitions produce `Ok(None)`. A malformed due
    /// timestamp is an error.
    pub fn desired_trigger(task: &Task, now: NaiveDateTime) -> Result<Option<TriggerSpec>> {
        if task.status.is_completed() {
            return Ok(None);
        }
        let Some(due) = task.due_timestamp()? else {
            return Ok(None);
        };

        let at_due_time = |day_of_week, day, month| {
            TriggerSpec::Cron(CronSpec {
                hour: due.hour(),
                minute: due.minute(),
                day_of_week,
                day,
                month,
                start: now,
            })
        };

        let trigger = match &task.repetition {
            Repetition::None if due < now => {
                debug!(task_id = task.id, %due, "due time already passed, no reminder");
                return Ok(None);
            }
            Repetition::None => TriggerSpec::Once { at: due },
            Repetition::Daily => at_due_time(None, None, None),
            Repetition::Weekly => at_due_time(Some(due.weekday()), None, None),
            Repetition::Monthly => at_due_time(None, Some(due.day()), None),
            Repetition::Yearly => at_due_time(None, Some(due.day()), Some(due.month())),
            Repetition::Other(label) => {
                warn!(task_id = task.id, "unknown repetition '{label}', no reminder");
                return Ok(None);
            }
        };
        Ok(Some(trigger))
    }

    /// Bring the scheduler's reminder jobs in line with `tasks`.
    ///
    /// Fails only when the scheduler is stopped or its job list cannot be
    /// read; per-task problems are logged and counted.
    pub fn reconcile(
        &self,
        tasks: &[Task],
        scheduler: &dyn JobScheduler,
        now: NaiveDateTime,
    ) -> Result<ReconcileSummary> {
        if !scheduler.is_running() {
            return Err(TaskminderError::SchedulerUnavailable(
                "scheduler is not running".into(),
            ));
        }

        let mut summary = ReconcileSummary::default();
        let mut desired: HashMap<String, DesiredJob> = HashMap::new();
        let mut lapsed: HashMap<String, NaiveDateTime> = HashMap::new();
        for task in tasks {
            if let Some(due) = lapsed_one_shot(task, now) {
                lapsed.insert(reminder_job_id(task.id), due);
                continue;
            }
            match Self::desired_trigger(task, now) {
                Ok(Some(trigger)) => {
                    desired.insert(
                        reminder_job_id(task.id),
                        DesiredJob {
                            task_id: task.id,
                            title: task.title.clone(),
                            trigger,
                        },
                    );
                }
                Ok(None) => {
                    let has_due = task.due_at.as_deref().is_some_and(|d| !d.trim().is_empty());
                    if has_due && !task.status.is_completed() {
                        summary.skipped += 1;
                    }
                }
                Err(e) => {
                    summary.skipped += 1;
                    warn!(task_id = task.id, "skipping reminder: {e}");
                }
            }
        }

        let existing: HashMap<String, Job> = scheduler
            .list_jobs()?
            .into_iter()
            .filter(|job| job.id.starts_with(REMINDER_JOB_PREFIX))
            .map(|job| (job.id.clone(), job))
            .collect();

        let mut ids: Vec<&String> = desired.keys().collect();
        ids.sort();
        for id in ids {
            let want = &desired[id];
            let is_update = match existing.get(id) {
                None => false,
                Some(job) if job.name == want.title && job.trigger.same_schedule(&want.trigger) => {
                    continue;
                }
                Some(_) => true,
            };

            match scheduler.add_job(id, &want.title, want.trigger.clone(), self.callback(want)) {
                Ok(()) if is_update => {
                    summary.updated += 1;
                    info!(task_id = want.task_id, trigger = %want.trigger, "updated reminder");
                }
                Ok(()) => {
                    summary.scheduled += 1;
                    info!(task_id = want.task_id, trigger = %want.trigger, "scheduled reminder");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(task_id = want.task_id, "cannot register reminder: {e}");
                }
            }
        }

        // Failed registrations stay in `desired`, so their ids are never swept.
        let mut keep: HashSet<&str> = desired.keys().map(String::as_str).collect();

        // A one-shot whose due time passed between the scheduler's tick and
        // this pass has not fired yet; leave it for the next tick.
        for (id, due) in &lapsed {
            match existing.get(id) {
                Some(job)
                    if job.next_run.is_some()
                        && job.trigger == (TriggerSpec::Once { at: *due }) =>
                {
                    debug!(job_id = %id, %due, "one-shot reminder still pending, keeping");
                    keep.insert(id.as_str());
                }
                _ => {
                    summary.skipped += 1;
                    debug!(job_id = %id, %due, "due time already passed, no reminder");
                }
            }
        }

        let mut stale: Vec<&String> = existing
            .keys()
            .filter(|id| !keep.contains(id.as_str()))
            .collect();
        stale.sort();
        for id in stale {
            match scheduler.remove_job(id) {
                Ok(true) => {
                    summary.removed_stale += 1;
                    info!(job_id = %id, "removed stale reminder");
                }
                Ok(false) => debug!(job_id = %id, "stale reminder already gone"),
                Err(e) => warn!(job_id = %id, "cannot remove stale reminder: {e}"),
            }
        }

        Ok(summary)
    }

    fn callback(&self, want: &DesiredJob) -> JobCallback {
        let queue = self.queue.clone();
        let clock = Arc::clone(&self.clock);
        let task_id = want.task_id;
        let title = want.title.clone();
        Arc::new(move || queue.on_trigger_at(task_id, &title, clock()))
    }
}

/// Due time of a pending one-off task that is already behind `now`.
fn lapsed_one_shot(task: &Task, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if task.repetition != Repetition::None || task.status.is_completed() {
        return None;
    }
    task.due_timestamp().ok().flatten().filter(|due| *due < now)
}

/// Load every task and reconcile reminder jobs against them.
pub fn run_reconcile_pass(
    store: &dyn TaskStore,
    scheduler: &dyn JobScheduler,
    reconciler: &Reconciler,
    now: NaiveDateTime,
) -> Result<ReconcileSummary> {
    let tasks = store.load_all()?;
    let summary = reconciler.reconcile(&tasks, scheduler, now)?;
    if summary.changed() || summary.failed > 0 {
        info!(
            scheduled = summary.scheduled,
            updated = summary.updated,
            removed = summary.removed_stale,
            skipped = summary.skipped,
            failed = summary.failed,
            "reminder jobs reconciled"
        );
    } else {
        debug!(skipped = summary.skipped, "reminder jobs already in sync");
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::reminders::queue::reminder_channel;
    use crate::store::SqliteTaskStore;
    use crate::task::TaskStatus;
    use crate::test_utils::{RecordingScheduler, at};
    use chrono::Weekday;

    fn task(id: i64, title: &str, repetition: Repetition, due: NaiveDateTime) -> Task {
        let mut t = Task::new(title).with_repetition(repetition).with_due(due);
        t.id = id;
        t
    }

    fn reconciler() -> Reconciler {
        let (tx, _rx) = reminder_channel();
        Reconciler::new(tx)
    }

    #[test]
    fn job_id_uses_reminder_prefix() {
        assert_eq!(reminder_job_id(42), "reminder_42");
    }

    #[test]
    fn desired_trigger_per_repetition() {
        let now = at(2024, 3, 4, 8, 0);
        let due = at(2024, 3, 8, 17, 30); // a Friday

        let once = Reconciler::desired_trigger(&task(1, "a", Repetition::None, due), now).unwrap();
        assert_eq!(once, Some(TriggerSpec::Once { at: due }));

        let Some(TriggerSpec::Cron(daily)) =
            Reconciler::desired_trigger(&task(1, "a", Repetition::Daily, due), now).unwrap()
        else {
            panic!("daily should be cron");
        };
        assert_eq!((daily.hour, daily.minute, daily.start), (17, 30, now));
        assert_eq!((daily.day_of_week, daily.day, daily.month), (None, None, None));

        let Some(TriggerSpec::Cron(weekly)) =
            Reconciler::desired_trigger(&task(1, "a", Repetition::Weekly, due), now).unwrap()
        else {
            panic!("weekly should be cron");
        };
        assert_eq!(weekly.day_of_week, Some(Weekday::Fri));

        let Some(TriggerSpec::Cron(monthly)) =
            Reconciler::desired_trigger(&task(1, "a", Repetition::Monthly, due), now).unwrap()
        else {
            panic!("monthly should be cron");
        };
        assert_eq!((monthly.day, monthly.month), (Some(8), None));

        let Some(TriggerSpec::Cron(yearly)) =
            Reconciler::desired_trigger(&task(1, "a", Repetition::Yearly, due), now).unwrap()
        else {
            panic!("yearly should be cron");
        };
        assert_eq!((yearly.day, yearly.month), (Some(8), Some(3)));

        let other = task(1, "a", Repetition::Other("hourly".into()), due);
        assert_eq!(Reconciler::desired_trigger(&other, now).unwrap(), None);
    }

    #[test]
    fn completed_and_undated_tasks_get_no_trigger() {
        let now = at(2024, 3, 4, 8, 0);
        let mut done = task(1, "a", Repetition::Daily, at(2024, 3, 5, 9, 0));
        done.status = TaskStatus::Completed;
        assert_eq!(Reconciler::desired_trigger(&done, now).unwrap(), None);

        let mut undated = Task::new("b");
        undated.id = 2;
        assert_eq!(Reconciler::desired_trigger(&undated, now).unwrap(), None);
    }

    #[test]
    fn first_run_schedules_and_second_run_is_idempotent() {
        let scheduler = RecordingScheduler::new();
        let r = reconciler();
        let tasks = vec![
            task(1, "stretch", Repetition::Daily, at(2024, 3, 1, 7, 0)),
            task(2, "dentist", Repetition::None, at(2024, 3, 20, 10, 0)),
        ];

        let first = r.reconcile(&tasks, &scheduler, at(2024, 3, 4, 8, 0)).unwrap();
        assert_eq!(first.scheduled, 2);
        assert!(scheduler.get_job("reminder_1").is_some());
        assert!(scheduler.get_job("reminder_2").is_some());

        // A minute later the daily trigger's start differs, but the schedule does not.
        let second = r.reconcile(&tasks, &scheduler, at(2024, 3, 4, 8, 1)).unwrap();
        assert_eq!(
            (second.scheduled, second.updated, second.removed_stale),
            (0, 0, 0)
        );
        assert_eq!(scheduler.add_calls(), 2);
    }

    #[test]
    fn changed_due_time_or_title_replaces_job() {
        let scheduler = RecordingScheduler::new();
        let r = reconciler();
        let now = at(2024, 3, 4, 8, 0);
        r.reconcile(
            &[task(1, "stretch", Repetition::Daily, at(2024, 3, 1, 7, 0))],
            &scheduler,
            now,
        )
        .unwrap();

        let moved = r
            .reconcile(
                &[task(1, "stretch", Repetition::Daily, at(2024, 3, 1, 7, 30))],
                &scheduler,
                now,
            )
            .unwrap();
        assert_eq!(moved.updated, 1);

        let renamed = r
            .reconcile(
                &[task(1, "yoga", Repetition::Daily, at(2024, 3, 1, 7, 30))],
                &scheduler,
                now,
            )
            .unwrap();
        assert_eq!(renamed.updated, 1);
        assert_eq!(scheduler.get_job("reminder_1").unwrap().name, "yoga");
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn stale_reminders_removed_and_foreign_jobs_untouched() {
        let scheduler = RecordingScheduler::new();
        let now = at(2024, 3, 4, 8, 0);
        for id in ["reminder_1", "reminder_2", "other_job_x"] {
            scheduler.seed(id, TriggerSpec::Interval { secs: 60 });
        }

        let summary = reconciler()
            .reconcile(
                &[task(1, "keep", Repetition::None, at(2024, 3, 5, 9, 0))],
                &scheduler,
                now,
            )
            .unwrap();

        assert_eq!(summary.removed_stale, 1);
        assert_eq!(summary.updated, 1);
        assert!(scheduler.get_job("reminder_1").is_some());
        assert!(scheduler.get_job("reminder_2").is_none());
        assert!(scheduler.get_job("other_job_x").is_some());
    }

    #[test]
    fn past_one_shot_is_never_scheduled() {
        let scheduler = RecordingScheduler::new();
        let summary = reconciler()
            .reconcile(
                &[task(1, "missed", Repetition::None, at(2024, 3, 1, 9, 0))],
                &scheduler,
                at(2024, 3, 4, 8, 0),
            )
            .unwrap();
        assert_eq!(summary.scheduled, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn malformed_due_does_not_abort_batch() {
        let scheduler = RecordingScheduler::new();
        let first = task(1, "first", Repetition::Daily, at(2024, 3, 1, 9, 0));
        let mut broken = task(2, "broken", Repetition::Daily, at(2024, 3, 1, 9, 0));
        broken.due_at = Some("next tuesday".into());
        let last = task(3, "last", Repetition::Weekly, at(2024, 3, 1, 9, 0));

        let summary = reconciler()
            .reconcile(&[first, broken, last], &scheduler, at(2024, 3, 4, 8, 0))
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.scheduled, 2);
        assert!(scheduler.get_job("reminder_1").is_some());
        assert!(scheduler.get_job("reminder_2").is_none());
        assert!(scheduler.get_job("reminder_3").is_some());
    }

    #[test]
    fn unfired_one_shot_survives_pass_after_its_due_time() {
        let scheduler = RecordingScheduler::new();
        let due = at(2024, 3, 4, 9, 0);
        scheduler.seed_pending("reminder_1", TriggerSpec::Once { at: due }, Some(due));

        let summary = reconciler()
            .reconcile(
                &[task(1, "standup", Repetition::None, due)],
                &scheduler,
                at(2024, 3, 4, 9, 1),
            )
            .unwrap();
        assert_eq!(summary.removed_stale, 0);
        assert_eq!(summary.skipped, 0);
        assert!(scheduler.get_job("reminder_1").is_some());
    }

    #[test]
    fn lapsed_one_shot_without_pending_job_is_swept() {
        let scheduler = RecordingScheduler::new();
        let due = at(2024, 3, 4, 9, 0);
        // Already fired: the scheduler has no next run for it.
        scheduler.seed_pending("reminder_1", TriggerSpec::Once { at: due }, None);
        // Registered for an older due time that has since moved.
        scheduler.seed_pending(
            "reminder_2",
            TriggerSpec::Once { at: at(2024, 3, 4, 8, 30) },
            Some(at(2024, 3, 4, 8, 30)),
        );

        let summary = reconciler()
            .reconcile(
                &[
                    task(1, "fired", Repetition::None, due),
                    task(2, "moved", Repetition::None, due),
                ],
                &scheduler,
                at(2024, 3, 4, 9, 1),
            )
            .unwrap();
        assert_eq!(summary.removed_stale, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn failed_registration_is_counted_and_not_swept() {
        let scheduler = RecordingScheduler::new();
        scheduler.seed("reminder_1", TriggerSpec::Interval { secs: 60 });
        scheduler.reject("reminder_1");

        let summary = reconciler()
            .reconcile(
                &[task(1, "flaky", Repetition::Daily, at(2024, 3, 1, 9, 0))],
                &scheduler,
                at(2024, 3, 4, 8, 0),
            )
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.removed_stale, 0);
        assert!(scheduler.get_job("reminder_1").is_some());
    }

    #[test]
    fn stopped_scheduler_aborts_cycle() {
        let scheduler = RecordingScheduler::new();
        scheduler.set_running(false);
        let err = reconciler()
            .reconcile(
                &[task(1, "a", Repetition::Daily, at(2024, 3, 1, 9, 0))],
                &scheduler,
                at(2024, 3, 4, 8, 0),
            )
            .unwrap_err();
        assert!(matches!(err, TaskminderError::SchedulerUnavailable(_)));
        assert_eq!(scheduler.len(), 0);
    }

    #[test]
    fn unreadable_job_list_aborts_cycle() {
        let scheduler = RecordingScheduler::new();
        scheduler.fail_list(true);
        let err = reconciler()
            .reconcile(&[], &scheduler, at(2024, 3, 4, 8, 0))
            .unwrap_err();
        assert!(matches!(err, TaskminderError::SchedulerUnavailable(_)));
    }

    #[test]
    fn registered_callback_enqueues_task() {
        let scheduler = RecordingScheduler::new();
        let (tx, rx) = reminder_channel();
        Reconciler::new(tx)
            .reconcile(
                &[task(7, "water plants", Repetition::Weekly, at(2024, 3, 1, 9, 0))],
                &scheduler,
                at(2024, 3, 4, 8, 0),
            )
            .unwrap();

        scheduler.fire("reminder_7");
        let message = rx.try_next().expect("queued");
        assert_eq!(message.task_id, 7);
        assert_eq!(message.title, "water plants");
    }

    #[test]
    fn reconcile_pass_reads_from_store() {
        let store = SqliteTaskStore::open_in_memory().unwrap();
        let call = Task::new("call mum")
            .with_repetition(Repetition::Daily)
            .with_due(at(2024, 3, 1, 18, 0));
        let id = store.save(&call).unwrap();
        store.save(&Task::new("no due")).unwrap();

        let scheduler = RecordingScheduler::new();
        let summary =
            run_reconcile_pass(&store, &scheduler, &reconciler(), at(2024, 3, 4, 8, 0)).unwrap();
        assert_eq!(summary.scheduled, 1);
        assert_eq!(summary.skipped, 0);
        assert!(scheduler.get_job(&reminder_job_id(id)).is_some());
    }
}
