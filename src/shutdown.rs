use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::manager::Manager;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is received.
/// If the handlers can't be installed the token is never cancelled by a signal.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }

        token_clone.cancel();
    });

    token
}

/// Cancel the running job, if any, and wait for it to wind down.
///
/// Gives up after `grace` so a workflow that ignores cancellation can't hold
/// the process hostage.
pub async fn drain_active_job(manager: Arc<Manager>, grace: Duration) {
    let scheduler = manager.scheduler();
    let Some(job) = scheduler.active_job() else {
        return;
    };
    job.cancel();

    match tokio::time::timeout(grace, scheduler.wait_idle()).await {
        Ok(()) => tracing::info!(job = %job.desc(), status = %job.status(), "Active job drained"),
        Err(_) => tracing::warn!(job = %job.desc(), "Active job still running at shutdown"),
    }
}
