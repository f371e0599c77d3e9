//! Periodic server status checks
//!
//! One check runs after a short startup delay, then one per interval, on a
//! single background task owned by a [`PollerHandle`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::service::{CoachService, StatusReport};

pub struct StatusPoller;

impl StatusPoller {
    pub fn spawn(service: Arc<CoachService>, initial_delay: Duration, interval: Duration) -> PollerHandle {
        let (tx, rx) = watch::channel(None);

        let task = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;

            let mut ticker = tokio::time::interval(interval);
            loop {
                // The first tick completes immediately, giving the startup check
                ticker.tick().await;
                let report = service.check_status().await;
                tracing::debug!("Status check: online={}", report.online);
                if tx.send(Some(report)).is_err() {
                    break;
                }
            }
        });

        tracing::info!(
            "Status polling started (first check in {:?}, then every {:?})",
            initial_delay,
            interval
        );
        PollerHandle { task, latest: rx }
    }
}

/// Owner of the polling task. Dropping it stops polling.
pub struct PollerHandle {
    task: JoinHandle<()>,
    latest: watch::Receiver<Option<StatusReport>>,
}

impl PollerHandle {
    /// Most recent completed check, if any
    pub fn latest(&self) -> Option<StatusReport> {
        self.latest.borrow().clone()
    }

    /// Wait for the next completed check. `None` once polling has stopped.
    pub async fn changed(&mut self) -> Option<StatusReport> {
        self.latest.changed().await.ok()?;
        self.latest.borrow_and_update().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn shutdown(self) {
        // Drop aborts the task
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!("Status polling stopped");
    }
}
