use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::services::orchestrator::JobOrchestrator;

/// Periodically reclaim a job whose ledger entry has not moved for `timeout`,
/// so a hung inference or storage call cannot block admission forever.
pub fn spawn_watchdog(
    orchestrator: Arc<JobOrchestrator>,
    timeout: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match orchestrator.reclaim_if_stuck(timeout).await {
                Ok(Some(task_id)) => {
                    tracing::warn!(task_id, timeout_secs = timeout.as_secs(), "Watchdog released admission");
                }
                Ok(None) => tracing::trace!("Watchdog found nothing stuck"),
                Err(e) => tracing::error!(error = %e, "Watchdog check failed"),
            }
        }
    })
}
