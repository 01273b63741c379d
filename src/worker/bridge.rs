use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::configuration::{OutputStream, WorkflowRun};
use crate::error::{ClustermError, Result};
use crate::scheduler::JobLogs;

/// How long to wait for the output stream to reach EOF once the workflow outcome is known.
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Couple a running workflow to a job: stream its output into the job logs and
/// turn the workflow outcome, or the job's cancellation, into a single result.
///
/// When `cancel` fires the workflow is asked to stop and its acknowledgement is
/// awaited (for at most `ack_timeout`, if set); the job then ends with
/// [`ClustermError::JobCancelled`] whatever the workflow reported.
pub async fn log_output_and_return_status(
    run: WorkflowRun,
    cancel: CancellationToken,
    logs: JobLogs,
    ack_timeout: Option<Duration>,
) -> Result<()> {
    let WorkflowRun {
        output,
        cancel: stop_workflow,
        mut result,
    } = run;

    let copier = tokio::spawn(copy_output(output, logs));

    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = &mut result => Some(res),
    };

    let outcome = match finished {
        Some(res) => flatten(res),
        None => {
            stop_workflow.cancel();
            wait_for_ack(result, ack_timeout).await;
            Err(ClustermError::JobCancelled)
        }
    };

    if tokio::time::timeout(LOG_DRAIN_TIMEOUT, copier).await.is_err() {
        tracing::debug!("Workflow output still open after the workflow finished, detaching");
    }

    outcome
}

fn flatten(res: std::result::Result<Result<()>, oneshot::error::RecvError>) -> Result<()> {
    match res {
        Ok(outcome) => outcome,
        Err(_) => Err(ClustermError::Workflow(
            "workflow exited without reporting a result".to_string(),
        )),
    }
}

async fn wait_for_ack(result: oneshot::Receiver<Result<()>>, ack_timeout: Option<Duration>) {
    let res = match ack_timeout {
        Some(limit) => match tokio::time::timeout(limit, result).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = limit.as_secs(),
                    "Workflow did not acknowledge cancellation in time"
                );
                return;
            }
        },
        None => result.await,
    };

    match flatten(res) {
        Ok(()) => tracing::info!("Workflow completed while being cancelled"),
        Err(e) => tracing::info!(error = %e, "Workflow stopped after cancellation"),
    }
}

async fn copy_output(output: OutputStream, logs: JobLogs) {
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                tracing::debug!(target: "clusterm::workflow", "{}", line);
                logs.push(line);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read workflow output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    struct FakeRun {
        writer: tokio::io::DuplexStream,
        stop: CancellationToken,
        result_tx: oneshot::Sender<Result<()>>,
    }

    fn fake_run() -> (WorkflowRun, FakeRun) {
        let (reader, writer) = tokio::io::duplex(1024);
        let stop = CancellationToken::new();
        let (result_tx, result_rx) = oneshot::channel();
        (
            WorkflowRun {
                output: Box::pin(reader),
                cancel: stop.clone(),
                result: result_rx,
            },
            FakeRun {
                writer,
                stop,
                result_tx,
            },
        )
    }

    #[tokio::test]
    async fn success_copies_output() {
        let (run, mut fake) = fake_run();
        let logs = JobLogs::new();

        fake.writer.write_all(b"line one\nline two\n").await.unwrap();
        drop(fake.writer);
        fake.result_tx.send(Ok(())).unwrap();

        log_output_and_return_status(run, CancellationToken::new(), logs.clone(), None)
            .await
            .unwrap();
        assert_eq!(logs.lines(), vec!["line one", "line two"]);
    }

    #[tokio::test]
    async fn workflow_error_is_returned() {
        let (run, fake) = fake_run();
        drop(fake.writer);
        fake.result_tx
            .send(Err(ClustermError::Workflow("exit 2".into())))
            .unwrap();

        let err = log_output_and_return_status(run, CancellationToken::new(), JobLogs::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClustermError::Workflow(msg) if msg == "exit 2"));
    }

    #[tokio::test]
    async fn dropped_result_channel_is_an_error() {
        let (run, fake) = fake_run();
        drop(fake.writer);
        drop(fake.result_tx);

        let err = log_output_and_return_status(run, CancellationToken::new(), JobLogs::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClustermError::Workflow(_)));
    }

    #[tokio::test]
    async fn cancellation_triggers_stop_and_waits_for_ack() {
        let (run, fake) = fake_run();
        let FakeRun {
            writer,
            stop,
            result_tx,
        } = fake;

        // Fake workflow: acknowledges the stop request with success.
        tokio::spawn(async move {
            stop.cancelled().await;
            drop(writer);
            let _ = result_tx.send(Ok(()));
        });

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = log_output_and_return_status(run, cancel, JobLogs::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClustermError::JobCancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_cancellation_times_out() {
        let (run, fake) = fake_run();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = log_output_and_return_status(
            run,
            cancel,
            JobLogs::new(),
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClustermError::JobCancelled));
        assert!(fake.stop.is_cancelled());
    }

    #[tokio::test]
    async fn invalid_utf8_is_logged_lossily() {
        let (run, mut fake) = fake_run();
        let logs = JobLogs::new();
        fake.writer.write_all(b"bad \xff byte\r\n").await.unwrap();
        drop(fake.writer);
        fake.result_tx.send(Ok(())).unwrap();

        log_output_and_return_status(run, CancellationToken::new(), logs.clone(), None)
            .await
            .unwrap();
        assert_eq!(logs.lines(), vec!["bad \u{fffd} byte"]);
    }
}
