//! Shared test utilities used across multiple test modules.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::new_without_default,
    clippy::len_without_is_empty
)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Result, TaskminderError};
use crate::scheduler::{Job, JobCallback, JobScheduler, TriggerSpec};

/// Build a local timestamp, panicking on invalid input.
pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, 0))
        .expect("valid timestamp")
}

/// In-memory [`JobScheduler`] that records registrations without a clock.
///
/// Jobs only fire when a test calls [`RecordingScheduler::fire`].
pub struct RecordingScheduler {
    jobs: Mutex<BTreeMap<String, (Job, Option<JobCallback>)>>,
    rejected: Mutex<HashSet<String>>,
    running: AtomicBool,
    fail_list: AtomicBool,
    add_calls: AtomicUsize,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(BTreeMap::new()),
            rejected: Mutex::new(HashSet::new()),
            running: AtomicBool::new(true),
            fail_list: AtomicBool::new(false),
            add_calls: AtomicUsize::new(0),
        }
    }

    /// Insert a job directly, bypassing `add_job` bookkeeping.
    pub fn seed(&self, id: &str, trigger: TriggerSpec) {
        self.seed_pending(id, trigger, None);
    }

    /// Insert a job with an explicit next run time.
    pub fn seed_pending(&self, id: &str, trigger: TriggerSpec, next_run: Option<NaiveDateTime>) {
        let job = Job {
            id: id.to_owned(),
            name: format!("seeded {id}"),
            trigger,
            next_run,
        };
        self.jobs.lock().unwrap().insert(id.to_owned(), (job, None));
    }

    /// Make every future `add_job` for `id` fail.
    pub fn reject(&self, id: &str) {
        self.rejected.lock().unwrap().insert(id.to_owned());
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Make `list_jobs` fail.
    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Successful and failed `add_job` calls so far.
    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Invoke a job's callback as if its trigger fired.
    pub fn fire(&self, id: &str) {
        let callback = self
            .jobs
            .lock()
            .unwrap()
            .get(id)
            .and_then(|(_, cb)| cb.clone())
            .expect("job with callback");
        callback();
    }
}

impl JobScheduler for RecordingScheduler {
    fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(id).map(|(job, _)| job.clone())
    }

    fn add_job(
        &self,
        id: &str,
        name: &str,
        trigger: TriggerSpec,
        callback: JobCallback,
    ) -> Result<()> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected.lock().unwrap().contains(id) {
            return Err(TaskminderError::JobRegistration(format!("{id} rejected")));
        }
        trigger.validate()?;
        let job = Job {
            id: id.to_owned(),
            name: name.to_owned(),
            trigger,
            next_run: None,
        };
        self.jobs
            .lock()
            .unwrap()
            .insert(id.to_owned(), (job, Some(callback)));
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<Job>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(TaskminderError::SchedulerUnavailable("job table unreadable".into()));
        }
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .map(|(job, _)| job.clone())
            .collect())
    }

    fn remove_job(&self, id: &str) -> Result<bool> {
        Ok(self.jobs.lock().unwrap().remove(id).is_some())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
