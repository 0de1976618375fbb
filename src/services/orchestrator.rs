//! Drives restoration jobs through their lifecycle.
//!
//! Submission (`submit`) runs on the request path: admission, task
//! creation, input persistence and scheduling all happen inside the
//! admission critical section, and the caller gets its handle back before
//! inference starts. "Accepted" means scheduled, not processed.
//!
//! Execution (`run`) happens on the worker. Each phase is written to the
//! task store and then the ledger. Any failure moves both to `Failed`,
//! which releases admission.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::queries::{StoreError, TaskStore};
use crate::models::message::{LinkResponse, ProgressResponse};
use crate::models::restoration::RestorationModel;
use crate::models::task::{Backend, TaskStatus};
use crate::services::admission::AdmissionController;
use crate::services::inference::{RestoreError, Restorer};
use crate::services::ledger::{LedgerError, ProgressLedger};
use crate::services::naming::blob_names;
use crate::services::queue::{JobQueue, QueueError, QueuedJob};
use crate::services::storage::{StorageError, StorageGateway};

/// A validated upload ready for admission.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub data: &'a [u8],
    /// Extension derived from the validated content type.
    pub extension: &'a str,
    pub filename: Option<&'a str>,
    pub model: RestorationModel,
}

/// Returned once a job has been accepted for processing.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskHandle {
    pub task_id: i64,
    pub source: String,
    pub output: String,
}

pub struct JobOrchestrator {
    store: TaskStore,
    ledger: Arc<ProgressLedger>,
    admission: AdmissionController,
    storage: StorageGateway,
    restorer: Arc<dyn Restorer>,
    queue: JobQueue,
}

impl JobOrchestrator {
    pub fn new(
        store: TaskStore,
        ledger: Arc<ProgressLedger>,
        storage: StorageGateway,
        restorer: Arc<dyn Restorer>,
        queue: JobQueue,
    ) -> Self {
        let admission = AdmissionController::new(ledger.clone(), store.clone());
        Self {
            store,
            ledger,
            admission,
            storage,
            restorer,
            queue,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn storage(&self) -> &StorageGateway {
        &self.storage
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Admit and schedule a job.
    pub async fn submit(&self, submission: Submission<'_>) -> Result<TaskHandle, SubmitError> {
        let Some(_permit) = self.admission.try_admit().await? else {
            metrics::counter!("restoration_jobs_rejected").increment(1);
            tracing::info!(ledger = ?self.ledger.read(), "Rejected submission, a job is already in flight");
            return Err(SubmitError::AlreadyProcessing);
        };

        let names = blob_names(submission.filename, submission.extension);
        let task = self
            .store
            .create(&names.source, &names.output, submission.model)
            .await?;
        let task_id = task.id;

        if let Err(e) = self.schedule(task_id, &task.source, submission).await {
            tracing::error!(task_id, error = %e, "Failed to schedule task");
            self.fail(task_id, &e.to_string()).await;
            return Err(e);
        }

        metrics::counter!("restoration_jobs_total").increment(1);
        tracing::info!(
            task_id,
            source = %task.source,
            output = %task.output,
            model = %submission.model,
            "Task scheduled"
        );

        Ok(TaskHandle {
            task_id,
            source: task.source,
            output: task.output,
        })
    }

    /// Persist the input where inference can read it, claim the ledger and
    /// hand the job to the worker.
    async fn schedule(
        &self,
        task_id: i64,
        source: &str,
        submission: Submission<'_>,
    ) -> Result<(), SubmitError> {
        self.storage.local().write(source, submission.data).await?;

        self.ledger.write(Some(task_id), TaskStatus::Pending).await?;
        self.store.update_status(task_id, TaskStatus::Scheduled).await?;
        self.ledger.advance(task_id, TaskStatus::Scheduled).await?;

        self.queue.enqueue(QueuedJob {
            task_id,
            model: submission.model,
        })?;
        Ok(())
    }

    /// Execute one job to completion or failure. Single attempt, no retry.
    pub async fn run(&self, job: QueuedJob) {
        let started = Instant::now();
        tracing::info!(task_id = job.task_id, model = %job.model, "Processing restoration job");

        // A reclaimed job is dropped at its next await point so the worker
        // can move on to the job admitted after it.
        let outcome = tokio::select! {
            biased;
            outcome = self.execute(&job) => outcome,
            _ = self.reclaimed(job.task_id) => Err(JobError::Superseded { task_id: job.task_id }),
        };

        match outcome {
            Ok(backend) => {
                metrics::counter!("restoration_jobs_finished").increment(1);
                metrics::histogram!("restoration_processing_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    task_id = job.task_id,
                    uploaded_to = %backend,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job finished"
                );
            }
            Err(JobError::Superseded { task_id }) => {
                tracing::warn!(task_id, "Job was reclaimed while running, dropping its result");
            }
            Err(e) => {
                metrics::counter!("restoration_jobs_failed").increment(1);
                tracing::error!(task_id = job.task_id, error = %e, "Job failed");
                self.fail(job.task_id, &e.to_string()).await;
            }
        }
    }

    async fn execute(&self, job: &QueuedJob) -> Result<Backend, JobError> {
        let task_id = job.task_id;
        let task = self
            .store
            .get(task_id)
            .await?
            .ok_or(StoreError::NotFound(task_id))?;

        self.advance(task_id, TaskStatus::Processing).await?;

        let input = self.storage.local().read(&task.source).await?;
        let restored = self.restorer.restore(&input, job.model).await?;
        tracing::debug!(task_id, input_bytes = input.len(), output_bytes = restored.len(), "Inference complete");

        self.advance(task_id, TaskStatus::Uploading).await?;

        let source_outcome = self.storage.store(&task.source, &input).await?;
        self.store
            .set_source_uploaded_to(task_id, source_outcome.backend)
            .await?;

        let output_outcome = self.storage.store(&task.output, &restored).await?;
        if let Some(e) = &output_outcome.remote_error {
            tracing::info!(task_id, reason = %e, "Output kept on local disk");
        }
        self.store
            .set_uploaded_to(task_id, output_outcome.backend)
            .await?;

        self.advance(task_id, TaskStatus::Finished).await?;
        Ok(output_outcome.backend)
    }

    /// Resolves once the ledger no longer tracks `task_id` as live: it was
    /// failed by the watchdog or handed to another task.
    async fn reclaimed(&self, task_id: i64) {
        let mut rx = self.ledger.subscribe();
        let released = rx
            .wait_for(|entry| entry.task_id != Some(task_id) || entry.status == TaskStatus::Failed)
            .await
            .is_ok();
        if !released {
            std::future::pending::<()>().await;
        }
    }

    /// Move task and ledger to `status`, task first.
    async fn advance(&self, task_id: i64, status: TaskStatus) -> Result<(), JobError> {
        match self.store.update_status(task_id, status).await {
            Err(StoreError::InvalidTransition { from, .. }) if from.is_terminal() => {
                return Err(JobError::Superseded { task_id });
            }
            other => other?,
        }
        self.ledger.advance(task_id, status).await?;
        Ok(())
    }

    /// Move a task and, if it still owns the ledger, the ledger to `Failed`.
    ///
    /// Best effort: errors are logged, never returned, so the caller's
    /// original error is the one reported.
    async fn fail(&self, task_id: i64, reason: &str) {
        match self.store.mark_failed(task_id, reason).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(task_id, "Task already terminal, not marking failed"),
            Err(e) => tracing::error!(task_id, error = %e, "Could not mark task failed"),
        }

        if self.ledger.read().task_id == Some(task_id) {
            if let Err(e) = self.ledger.advance(task_id, TaskStatus::Failed).await {
                tracing::error!(task_id, error = %e, "Could not release ledger");
            }
        }
    }

    /// Resolve a ledger left in flight by a previous process.
    ///
    /// The interrupted job is not resumed: its task is failed and admission
    /// reopens. Returns the id of the task that was failed, if any.
    pub async fn recover(&self) -> Result<Option<i64>, JobError> {
        let entry = self.ledger.read();
        let Some(task_id) = entry.task_id.filter(|_| !entry.is_idle()) else {
            return Ok(None);
        };

        tracing::warn!(task_id, status = %entry.status, "Recovering job interrupted by restart");
        match self.store.mark_failed(task_id, "interrupted by restart").await {
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.ledger.write(Some(task_id), TaskStatus::Failed).await?;
        Ok(Some(task_id))
    }

    /// Fail the in-flight job if the ledger has not moved for `timeout`.
    ///
    /// Returns the id of the reclaimed task, if any.
    pub async fn reclaim_if_stuck(&self, timeout: Duration) -> Result<Option<i64>, JobError> {
        let entry = self.ledger.read();
        let Some(task_id) = entry.task_id.filter(|_| !entry.is_idle()) else {
            return Ok(None);
        };

        let age = Utc::now().signed_duration_since(entry.updated_at);
        if age.to_std().map_or(true, |age| age < timeout) {
            return Ok(None);
        }

        tracing::warn!(
            task_id,
            status = %entry.status,
            stalled_secs = age.num_seconds(),
            "Reclaiming stuck job"
        );
        let reason = format!("timed out in {} after {}s", entry.status, age.num_seconds());
        match self.store.mark_failed(task_id, &reason).await {
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        match self.ledger.advance(task_id, TaskStatus::Failed).await {
            Ok(()) => {
                metrics::counter!("watchdog_reclaims_total").increment(1);
                Ok(Some(task_id))
            }
            // The job moved on or finished between the read and the write
            Err(LedgerError::Stale { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Current ledger state as seen by clients.
    pub fn progress(&self) -> ProgressResponse {
        let entry = self.ledger.read();
        ProgressResponse {
            status: entry.status,
            task_id: entry.task_id,
        }
    }

    /// Public links to a task's blobs. Empty strings for unknown tasks.
    pub async fn links(&self, task_id: i64) -> Result<LinkResponse, StoreError> {
        let Some(task) = self.store.get(task_id).await? else {
            return Ok(LinkResponse::default());
        };

        // The source is on local disk from submission onwards
        let source_backend = task
            .source_uploaded_to
            .or(task.uploaded_to)
            .unwrap_or(Backend::Local);

        Ok(LinkResponse {
            source_link: self.storage.link(&task.source, source_backend),
            output_link: task
                .uploaded_to
                .map(|backend| self.storage.link(&task.output, backend))
                .unwrap_or_default(),
        })
    }
}

/// Errors returned synchronously to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Another job is already being processed")]
    AlreadyProcessing,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors ending a job on the execution path.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Inference failed: {0}")]
    Inference(#[from] RestoreError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Task store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Task {task_id} was reclaimed before it could finish")]
    Superseded { task_id: i64 },
}
