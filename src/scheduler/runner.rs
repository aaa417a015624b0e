//! Scheduler background loop.
//!
//! Spawns a tokio task that ticks on a fixed interval, collects the jobs
//! whose fire time has passed, and runs their callbacks in firing order on
//! a blocking worker. The job table lock is never held while a callback
//! runs, so callbacks may register or remove jobs themselves.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Job, JobCallback, JobScheduler, TriggerSpec};
use crate::error::{Result, TaskminderError};

/// Default interval between scheduler ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Source of "now" for the scheduler.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

struct JobEntry {
    job: Job,
    callback: JobCallback,
}

/// In-process job scheduler driven by a tokio interval.
pub struct BackgroundScheduler {
    /// Registered jobs by id.
    jobs: Mutex<HashMap<String, JobEntry>>,
    /// Set between `start` and `shutdown`.
    running: AtomicBool,
    /// Stops the tick loop.
    cancel: CancellationToken,
    tick_interval: Duration,
    clock: Clock,
}

impl Default for BackgroundScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundScheduler {
    /// Create a stopped scheduler using the local wall clock.
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Override the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(10));
        self
    }

    /// Override the clock (tests).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Shared handle to the scheduler's clock.
    pub fn clock(&self) -> Clock {
        Arc::clone(&self.clock)
    }

    /// Current time according to the scheduler's clock.
    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Start the background loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            info!(
                "scheduler started with {} jobs",
                scheduler.jobs.lock().map(|j| j.len()).unwrap_or(0)
            );
            let mut interval = tokio::time::interval(scheduler.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = scheduler.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let due = scheduler.collect_due(scheduler.now());
                if due.is_empty() {
                    continue;
                }
                let worker = tokio::task::spawn_blocking(move || run_callbacks(due));
                if let Err(e) = worker.await {
                    error!("scheduler worker failed: {e}");
                }
            }

            scheduler.running.store(false, Ordering::SeqCst);
            info!("scheduler stopped");
        })
    }

    /// Stop the loop and drop every registered job.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.running.store(false, Ordering::SeqCst);
        match self.lock() {
            Ok(mut jobs) => jobs.clear(),
            Err(e) => warn!("cannot clear jobs on shutdown: {e}"),
        }
    }

    /// Run every job due at `now` on the calling thread. Returns the number fired.
    pub fn run_pending(&self, now: NaiveDateTime) -> usize {
        let due = self.collect_due(now);
        let count = due.len();
        run_callbacks(due);
        count
    }

    /// Advance due jobs and hand back their callbacks in firing order.
    ///
    /// One-shot jobs are removed; recurring jobs get their next fire time.
    fn collect_due(&self, now: NaiveDateTime) -> Vec<(String, JobCallback)> {
        let mut jobs = match self.lock() {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("scheduler tick skipped: {e}");
                return Vec::new();
            }
        };

        let mut due: Vec<(NaiveDateTime, String, JobCallback)> = Vec::new();
        for entry in jobs.values_mut() {
            let Some(next) = entry.job.next_run else {
                continue;
            };
            if next > now {
                continue;
            }
            due.push((next, entry.job.id.clone(), Arc::clone(&entry.callback)));
            entry.job.next_run = entry.job.trigger.fire_after(now);
        }
        jobs.retain(|_, entry| entry.job.next_run.is_some());

        due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        due.into_iter().map(|(_, id, cb)| (id, cb)).collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, JobEntry>>> {
        self.jobs
            .lock()
            .map_err(|e| TaskminderError::SchedulerUnavailable(format!("job table poisoned: {e}")))
    }
}

/// Run callbacks in order; a panicking callback is logged and does not stop the rest.
fn run_callbacks(due: Vec<(String, JobCallback)>) {
    for (id, callback) in due {
        debug!(job_id = %id, "firing job");
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
            error!(job_id = %id, "job callback panicked");
        }
    }
}

impl JobScheduler for BackgroundScheduler {
    fn get_job(&self, id: &str) -> Option<Job> {
        self.lock().ok()?.get(id).map(|entry| entry.job.clone())
    }

    fn add_job(
        &self,
        id: &str,
        name: &str,
        trigger: TriggerSpec,
        callback: JobCallback,
    ) -> Result<()> {
        trigger.validate()?;
        let next_run = trigger.first_fire(self.now()).ok_or_else(|| {
            TaskminderError::JobRegistration(format!("trigger for '{id}' never fires ({trigger})"))
        })?;

        let entry = JobEntry {
            job: Job {
                id: id.to_owned(),
                name: name.to_owned(),
                trigger,
                next_run: Some(next_run),
            },
            callback,
        };
        self.lock()
            .map_err(|e| TaskminderError::JobRegistration(e.to_string()))?
            .insert(id.to_owned(), entry);
        debug!(job_id = id, %next_run, "job registered");
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<Job>> {
        let jobs = self.lock()?;
        let mut list: Vec<Job> = jobs.values().map(|entry| entry.job.clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    fn remove_job(&self, id: &str) -> Result<bool> {
        Ok(self
            .lock()
            .map_err(|e| TaskminderError::JobRegistration(e.to_string()))?
            .remove(id)
            .is_some())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
