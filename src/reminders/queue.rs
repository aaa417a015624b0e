//! Reminder hand-off queue.
//!
//! Unbounded FIFO over a crossbeam channel. The sending half lives inside
//! scheduler callbacks and never blocks; the receiving half is polled by
//! the single consumer.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::error::TaskminderError;

/// A fired reminder. Carries only what the consumer needs to re-fetch the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    /// Task identity.
    pub task_id: i64,
    /// Title at the time the job was registered.
    pub title: String,
    /// When the trigger fired.
    pub fired_at: NaiveDateTime,
}

/// Create a connected sender/receiver pair.
pub fn reminder_channel() -> (ReminderSender, ReminderReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ReminderSender { tx }, ReminderReceiver { rx })
}

/// Producer half, cloned into every reminder job callback.
#[derive(Debug, Clone)]
pub struct ReminderSender {
    tx: Sender<ReminderMessage>,
}

impl ReminderSender {
    /// Trigger handler: enqueue a reminder for `task_id`, stamped with the
    /// local wall clock.
    ///
    /// Never blocks and never panics. A closed queue is logged and the
    /// message dropped.
    pub fn on_trigger(&self, task_id: i64, title: &str) {
        self.on_trigger_at(task_id, title, Local::now().naive_local());
    }

    /// Same as [`ReminderSender::on_trigger`] with an explicit fire time.
    pub fn on_trigger_at(&self, task_id: i64, title: &str, fired_at: NaiveDateTime) {
        let message = ReminderMessage {
            task_id,
            title: title.to_owned(),
            fired_at,
        };
        match self.tx.send(message) {
            Ok(()) => debug!(task_id, "reminder queued"),
            Err(e) => {
                let err = TaskminderError::QueueHandoff(format!("receiver dropped: {e}"));
                warn!(task_id, "{err}");
            }
        }
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct ReminderReceiver {
    rx: Receiver<ReminderMessage>,
}

impl ReminderReceiver {
    /// Take the next message without blocking.
    pub fn try_next(&self) -> Option<ReminderMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block until a message arrives or every sender is gone.
    pub fn next_blocking(&self) -> Option<ReminderMessage> {
        self.rx.recv().ok()
    }

    /// Block for at most `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ReminderMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<ReminderMessage> {
        self.rx.try_iter().collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
