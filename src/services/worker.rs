use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::services::orchestrator::JobOrchestrator;
use crate::services::queue::JobReceiver;

/// Start the background worker. Jobs run one at a time in arrival order;
/// the loop ends once every queue sender has been dropped.
pub fn spawn_worker(orchestrator: Arc<JobOrchestrator>, mut jobs: JobReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Worker ready, waiting for jobs");

        while let Some(job) = jobs.dequeue().await {
            let task_id = job.task_id;
            // A panicking job must not take the worker down with it
            let orchestrator = orchestrator.clone();
            let outcome = tokio::spawn(async move { orchestrator.run(job).await }).await;
            if let Err(e) = outcome {
                tracing::error!(task_id, error = %e, "Job task aborted");
            }
        }

        tracing::info!("Job queue closed, worker stopping");
    })
}
