//! Job execution side of the manager.
//!
//! Lifecycle jobs don't do the provisioning work themselves: they launch a
//! workflow through the configuration subsystem and hand the resulting
//! [`WorkflowRun`](crate::configuration::WorkflowRun) to the bridge in this
//! module, which
//!
//! 1. copies the workflow output into the job log until EOF,
//! 2. forwards job cancellation to the workflow and waits for it to stop,
//! 3. reduces everything to one `Result` the job maps to its terminal status.

pub mod bridge;

pub use bridge::log_output_and_return_status;
