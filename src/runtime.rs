//! Wiring of store, scheduler and reminder pipeline.
//!
//! [`Runtime`] owns no globals: the caller hands in the store and the
//! scheduler, calls [`Runtime::start`] inside a tokio runtime, and polls the
//! returned [`ReminderReceiver`] on its own thread.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{Result, TaskminderError};
use crate::recurrence::{ResetSummary, run_reset_pass};
use crate::reminders::{
    ReconcileSummary, Reconciler, ReminderReceiver, reminder_channel, run_reconcile_pass,
};
use crate::scheduler::{BackgroundScheduler, JobCallback, JobScheduler, TriggerSpec};
use crate::store::TaskStore;

/// Scheduler job running the recurrence reset pass.
pub const RESET_JOB_ID: &str = "system_reset";
/// Scheduler job running the reminder reconcile pass.
pub const RECONCILE_JOB_ID: &str = "system_reconcile";

/// The running reminder engine.
pub struct Runtime {
    config: AppConfig,
    store: Arc<dyn TaskStore>,
    scheduler: Arc<BackgroundScheduler>,
    reconciler: Reconciler,
    receiver: Option<ReminderReceiver>,
    loop_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Wire a runtime around an existing store and a not-yet-started scheduler.
    ///
    /// Fired reminders are stamped with the scheduler's clock.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn TaskStore>,
        scheduler: Arc<BackgroundScheduler>,
    ) -> Self {
        let (sender, receiver) = reminder_channel();
        let reconciler = Reconciler::new(sender).with_clock(scheduler.clock());
        Self {
            config,
            store,
            scheduler,
            reconciler,
            receiver: Some(receiver),
            loop_handle: None,
        }
    }

    /// The task store the runtime reads and writes.
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// The scheduler driving reminder and maintenance jobs.
    pub fn scheduler(&self) -> &Arc<BackgroundScheduler> {
        &self.scheduler
    }

    /// Start the scheduler loop, bring reminders up to date, and register
    /// the periodic reset and reconcile jobs.
    ///
    /// Must be called from within a tokio runtime. Returns the consumer end
    /// of the reminder queue; a second call fails.
    pub fn start(&mut self) -> Result<ReminderReceiver> {
        let receiver = self.receiver.take().ok_or_else(|| {
            TaskminderError::SchedulerUnavailable("runtime already started".into())
        })?;
        self.loop_handle = Some(self.scheduler.start());

        // Startup passes are best effort; the periodic jobs retry.
        if let Err(e) = self.reset_now() {
            warn!("startup reset pass failed: {e}");
        }
        if let Err(e) = self.reconcile_now() {
            warn!("startup reconcile failed: {e}");
        }

        let cadence = &self.config.scheduler;
        self.scheduler.add_job(
            RESET_JOB_ID,
            "Recurrence reset",
            TriggerSpec::Interval {
                secs: cadence.reset_interval_secs,
            },
            self.reset_callback(),
        )?;
        self.scheduler.add_job(
            RECONCILE_JOB_ID,
            "Reminder reconcile",
            TriggerSpec::Interval {
                secs: cadence.reconcile_interval_secs,
            },
            self.reconcile_callback(),
        )?;

        info!(
            reset_secs = cadence.reset_interval_secs,
            reconcile_secs = cadence.reconcile_interval_secs,
            "runtime started"
        );
        Ok(receiver)
    }

    /// Run one recurrence reset pass against the scheduler's clock.
    pub fn reset_now(&self) -> Result<ResetSummary> {
        run_reset_pass(self.store.as_ref(), self.scheduler.now().date())
    }

    /// Run one reconcile pass against the scheduler's clock.
    pub fn reconcile_now(&self) -> Result<ReconcileSummary> {
        run_reconcile_pass(
            self.store.as_ref(),
            self.scheduler.as_ref(),
            &self.reconciler,
            self.scheduler.now(),
        )
    }

    /// Stop the scheduler and wait for its loop to exit.
    pub async fn shutdown(&mut self) {
        self.scheduler.shutdown();
        if let Some(handle) = self.loop_handle.take()
            && let Err(e) = handle.await
        {
            warn!("scheduler loop ended abnormally: {e}");
        }
        info!("runtime stopped");
    }

    fn reset_callback(&self) -> JobCallback {
        let store = Arc::clone(&self.store);
        let scheduler: Weak<BackgroundScheduler> = Arc::downgrade(&self.scheduler);
        Arc::new(move || {
            let Some(scheduler) = scheduler.upgrade() else {
                return;
            };
            if let Err(e) = run_reset_pass(store.as_ref(), scheduler.now().date()) {
                warn!("reset pass failed: {e}");
            }
        })
    }

    fn reconcile_callback(&self) -> JobCallback {
        let store = Arc::clone(&self.store);
        let reconciler = self.reconciler.clone();
        let scheduler: Weak<BackgroundScheduler> = Arc::downgrade(&self.scheduler);
        Arc::new(move || {
            let Some(scheduler) = scheduler.upgrade() else {
                return;
            };
            let now = scheduler.now();
            if let Err(e) = run_reconcile_pass(store.as_ref(), scheduler.as_ref(), &reconciler, now)
            {
                warn!("reconcile pass failed: {e}");
            }
        })
    }
}
