use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::restoration::RestorationModel;

/// Unit of work handed from the submission path to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub task_id: i64,
    pub model: RestorationModel,
}

/// Sending half of the in-process job queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
}

/// Receiving half, owned by the worker.
pub struct JobReceiver {
    rx: mpsc::Receiver<QueuedJob>,
}

/// Create a bounded queue. Admission keeps at most one job in flight, so
/// a small capacity is plenty.
pub fn job_queue(capacity: usize) -> (JobQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobQueue { tx }, JobReceiver { rx })
}

impl JobQueue {
    /// Hand a job to the worker without waiting.
    pub fn enqueue(&self, job: QueuedJob) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => QueueError::Full(job.task_id),
            mpsc::error::TrySendError::Closed(job) => QueueError::Closed(job.task_id),
        })
    }

    /// Number of jobs waiting for the worker.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Whether a worker is still attached.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl JobReceiver {
    /// Wait for the next job. `None` once every sender is gone.
    pub async fn dequeue(&mut self) -> Option<QueuedJob> {
        self.rx.recv().await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job queue is full, task {0} not scheduled")]
    Full(i64),

    #[error("Worker has stopped, task {0} not scheduled")]
    Closed(i64),
}
