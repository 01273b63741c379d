use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::{ClustermError, Result};
use crate::scheduler::job::{DoneCallback, Job, JobRunner};

#[derive(Debug, Default)]
struct JobSlots {
    active: Option<Arc<Job>>,
    last: Option<Arc<Job>>,
}

/// Single-flight gate for cluster-mutating jobs.
///
/// At most one job is active at any time. Installing a job is a single critical
/// section, so two concurrent triggers can never both get through.
#[derive(Debug, Default)]
pub struct JobScheduler {
    slots: Mutex<JobSlots>,
    idle: Notify,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, JobSlots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a new job as the active one, unless a job is already active.
    pub fn check_and_set_active_job(
        &self,
        desc: impl Into<String>,
        runner: JobRunner,
        done_cb: DoneCallback,
    ) -> Result<Arc<Job>> {
        let mut slots = self.slots();
        if let Some(active) = &slots.active {
            return Err(ClustermError::ActiveJob(active.desc().to_string()));
        }
        let job = Arc::new(Job::new(desc, runner, done_cb));
        tracing::debug!(job = %job.desc(), job_id = %job.id(), "Active job set");
        slots.active = Some(job.clone());
        Ok(job)
    }

    /// Move the active job, if any, to the last job slot.
    pub fn reset_active_job(&self) {
        {
            let mut slots = self.slots();
            let Some(job) = slots.active.take() else {
                return;
            };
            tracing::debug!(job = %job.desc(), status = %job.status(), "Active job reset");
            slots.last = Some(job);
        }
        self.idle.notify_waiters();
    }

    /// Resolve once no job is active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // register before checking so a reset in between isn't missed
            notified.as_mut().enable();
            if self.slots().active.is_none() {
                return;
            }
            notified.await;
        }
    }

    /// Run the active job in the calling task and release the gate afterwards,
    /// whatever the outcome.
    pub async fn run_active_job(&self) {
        let Some(job) = self.active_job() else {
            tracing::error!("run called without an active job");
            return;
        };
        job.run().await;
        self.reset_active_job();
    }

    pub fn active_job(&self) -> Option<Arc<Job>> {
        self.slots().active.clone()
    }

    pub fn last_job(&self) -> Option<Arc<Job>> {
        self.slots().last.clone()
    }

    /// Signal cancellation to the active job. Returns its description.
    pub fn cancel_active_job(&self) -> Result<String> {
        let job = self.active_job().ok_or(ClustermError::NoActiveJob)?;
        job.cancel();
        Ok(job.desc().to_string())
    }
}

/// Releases the gate on drop unless disarmed. Armed right after a job is
/// registered, disarmed once the job has been handed to a task.
#[derive(Debug)]
pub struct ActiveJobGuard<'a> {
    scheduler: &'a JobScheduler,
    armed: bool,
}

impl<'a> ActiveJobGuard<'a> {
    pub fn new(scheduler: &'a JobScheduler) -> Self {
        Self {
            scheduler,
            armed: true,
        }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ActiveJobGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.reset_active_job();
        }
    }
}
