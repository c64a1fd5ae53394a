//! Graceful shutdown handling.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Stops a scan's background monitor task.
///
/// Signals the task through `cancel` and waits up to `grace` for it to exit; a task
/// still running after that is aborted.
pub async fn shutdown_gracefully(
    cancel: CancellationToken,
    monitor_task: Option<tokio::task::JoinHandle<()>>,
    grace: Duration,
) {
    cancel.cancel();
    if let Some(mut task) = monitor_task {
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            log::debug!("Monitor task did not stop within {:?}; aborting", grace);
            task.abort();
        }
    }
}
