use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ClustermError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Errored,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Errored | JobStatus::Cancelled
        )
    }

    /// Created jobs either start running or get cancelled before they start;
    /// running jobs end in one of the terminal states.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Created => matches!(next, JobStatus::Running | JobStatus::Cancelled),
            JobStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Created => write!(f, "created"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Errored => write!(f, "errored"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The work of a job. Receives the job's cancellation token and log sink.
pub type JobRunner = Box<dyn FnOnce(CancellationToken, JobLogs) -> BoxFuture<Result<()>> + Send>;

/// Invoked once with the terminal status and the runner's error, if any.
pub type DoneCallback = Box<dyn FnOnce(JobStatus, Option<ClustermError>) -> BoxFuture<()> + Send>;

/// Append-only log buffer shared between a job and its runner.
#[derive(Debug, Clone, Default)]
pub struct JobLogs {
    lines: Arc<Mutex<Vec<String>>>,
}

impl JobLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contents(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// Read-only snapshot of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub desc: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub logs: Vec<String>,
}

/// A single unit of asynchronous, cancellable work.
pub struct Job {
    id: Uuid,
    desc: String,
    created_at: DateTime<Utc>,
    state: Mutex<JobState>,
    runner: Mutex<Option<JobRunner>>,
    done_cb: Mutex<Option<DoneCallback>>,
    cancel: CancellationToken,
    logs: JobLogs,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.desc)
    }
}

impl Job {
    pub fn new(desc: impl Into<String>, runner: JobRunner, done_cb: DoneCallback) -> Self {
        Self {
            id: Uuid::new_v4(),
            desc: desc.into(),
            created_at: Utc::now(),
            state: Mutex::new(JobState {
                status: JobStatus::Created,
                error: None,
                started_at: None,
                completed_at: None,
            }),
            runner: Mutex::new(Some(runner)),
            done_cb: Mutex::new(Some(done_cb)),
            cancel: CancellationToken::new(),
            logs: JobLogs::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn logs(&self) -> &JobLogs {
        &self.logs
    }

    /// Ask the job to stop. The runner decides how to wind down.
    pub fn cancel(&self) {
        tracing::info!(job = %self.desc, "Cancelling job");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn info(&self) -> JobInfo {
        let state = self.state();
        JobInfo {
            id: self.id,
            desc: self.desc.clone(),
            status: state.status,
            error: state.error.clone(),
            created_at: self.created_at,
            started_at: state.started_at,
            completed_at: state.completed_at,
            logs: self.logs.lines(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: JobStatus, error: Option<String>) -> bool {
        let mut state = self.state();
        if !state.status.can_transition_to(next) {
            tracing::warn!(job = %self.desc, from = %state.status, to = %next, "Refusing job status change");
            return false;
        }
        state.status = next;
        match next {
            JobStatus::Running => state.started_at = Some(Utc::now()),
            _ => {
                state.error = error;
                state.completed_at = Some(Utc::now());
            }
        }
        true
    }

    /// Run the job to completion and invoke its done-callback.
    ///
    /// A job cancelled before it starts finishes as `Cancelled` without calling
    /// its runner. A job can only run once.
    pub async fn run(&self) {
        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let done_cb = self
            .done_cb
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(runner) = runner else {
            tracing::warn!(job = %self.desc, "Job has already run");
            return;
        };

        let result = if self.cancel.is_cancelled() {
            Err(ClustermError::JobCancelled)
        } else {
            self.transition(JobStatus::Running, None);
            tracing::info!(job = %self.desc, job_id = %self.id, "Job started");
            // The runner gets its own task so a panic ends the job instead of
            // the scheduler loop.
            match tokio::spawn(runner(self.cancel.clone(), self.logs.clone())).await {
                Ok(result) => result,
                Err(e) => Err(ClustermError::Workflow(format!("job runner aborted: {e}"))),
            }
        };

        let (status, err) = match result {
            Ok(()) => (JobStatus::Completed, None),
            Err(ClustermError::JobCancelled) => {
                (JobStatus::Cancelled, Some(ClustermError::JobCancelled))
            }
            Err(e) => (JobStatus::Errored, Some(e)),
        };
        self.transition(status, err.as_ref().map(ToString::to_string));

        match &err {
            None => tracing::info!(job = %self.desc, job_id = %self.id, "Job completed"),
            Some(e) => {
                tracing::warn!(job = %self.desc, job_id = %self.id, status = %status, error = %e, "Job finished")
            }
        }

        if let Some(done_cb) = done_cb {
            done_cb(status, err).await;
        }
    }
}
