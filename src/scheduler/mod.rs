pub mod gate;
pub mod job;

pub use gate::{ActiveJobGuard, JobScheduler};
pub use job::{BoxFuture, DoneCallback, Job, JobInfo, JobLogs, JobRunner, JobStatus};
