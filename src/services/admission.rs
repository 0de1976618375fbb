use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::queries::{StoreError, TaskStore};
use crate::services::ledger::{LedgerEntry, ProgressLedger};

/// Proof that the caller won admission.
///
/// Holding the permit keeps every other submission out of the critical
/// section, so the caller can create its task and claim the ledger before
/// anyone else reads it.
pub struct AdmissionPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Gate allowing a new job only while nothing else is in flight.
pub struct AdmissionController {
    ledger: Arc<ProgressLedger>,
    store: TaskStore,
    gate: Arc<Mutex<()>>,
}

impl AdmissionController {
    pub fn new(ledger: Arc<ProgressLedger>, store: TaskStore) -> Self {
        Self {
            ledger,
            store,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Whether a new job could start right now. No side effects.
    pub async fn is_idle(&self) -> Result<bool, StoreError> {
        self.entry_allows_admission(&self.ledger.read()).await
    }

    /// Enter the critical section and admit the caller if the service is idle.
    ///
    /// Returns `None` on rejection; the gate is released immediately.
    pub async fn try_admit(&self) -> Result<Option<AdmissionPermit>, StoreError> {
        let guard = self.gate.clone().lock_owned().await;
        if self.entry_allows_admission(&self.ledger.read()).await? {
            Ok(Some(AdmissionPermit { _guard: guard }))
        } else {
            Ok(None)
        }
    }

    /// An entry naming a task that already ended, or a task that does not
    /// exist, is stale and counts as idle.
    async fn entry_allows_admission(&self, entry: &LedgerEntry) -> Result<bool, StoreError> {
        if entry.is_idle() {
            return Ok(true);
        }
        let Some(task_id) = entry.task_id else {
            return Ok(true);
        };

        match self.store.get(task_id).await? {
            Some(task) if task.status.is_terminal() => {
                tracing::debug!(task_id, ledger_status = %entry.status, task_status = %task.status, "Ledger is stale, treating as idle");
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                tracing::warn!(task_id, "Ledger references an unknown task, treating as idle");
                Ok(true)
            }
        }
    }
}
