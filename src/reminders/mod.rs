//! Reminder scheduling and delivery.
//!
//! - `queue`: hand-off channel from scheduler callbacks to the consumer.
//! - `reconcile`: keeps the scheduler's reminder jobs in step with the task table.
//! - `consumer`: presentation-side polling and the user-action contract.

pub mod consumer;
pub mod queue;
pub mod reconcile;

pub use consumer::{PollSummary, ReminderActions, ReminderPresenter, poll_reminders};
pub use queue::{ReminderMessage, ReminderReceiver, ReminderSender, reminder_channel};
pub use reconcile::{
    REMINDER_JOB_PREFIX, ReconcileSummary, Reconciler, reminder_job_id, run_reconcile_pass,
};
