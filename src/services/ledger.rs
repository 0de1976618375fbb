//! Single-slot record of the job currently owning the service.
//!
//! The record is persisted as one JSON document that is overwritten on every
//! transition (write to a sibling temp file, then rename), so a crash leaves
//! either the previous or the next state on disk, never a torn one. Readers
//! go through an in-memory copy published on a `watch` channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};

use crate::models::task::TaskStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub task_id: Option<i64>,
    pub status: TaskStatus,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// The safe default: nothing running, admission open.
    pub fn idle() -> Self {
        Self {
            task_id: None,
            status: TaskStatus::Finished,
            updated_at: Utc::now(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.task_id.is_none() || self.status.is_terminal()
    }
}

pub struct ProgressLedger {
    path: PathBuf,
    state: watch::Sender<LedgerEntry>,
    write_lock: Mutex<()>,
}

impl ProgressLedger {
    /// Load the ledger from `path`.
    ///
    /// A missing or unreadable record starts the ledger idle; it never
    /// defaults to busy.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let entry = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<LedgerEntry>(&bytes) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ledger record is corrupt, starting idle");
                    LedgerEntry::idle()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No ledger record found, starting idle");
                LedgerEntry::idle()
            }
            Err(e) => return Err(LedgerError::Io(e)),
        };

        let (state, _) = watch::channel(entry);
        Ok(Self {
            path,
            state,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest entry. Never blocks on writers.
    pub fn read(&self) -> LedgerEntry {
        self.state.borrow().clone()
    }

    /// Receiver notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<LedgerEntry> {
        self.state.subscribe()
    }

    /// Overwrite the record unconditionally.
    pub async fn write(&self, task_id: Option<i64>, status: TaskStatus) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock().await;
        self.persist_and_publish(LedgerEntry {
            task_id,
            status,
            updated_at: Utc::now(),
        })
        .await
    }

    /// Move the record for `task_id` to `status`.
    ///
    /// Fails without writing when the ledger has moved on to another task or
    /// the transition would not be forward, so a reclaimed job cannot
    /// overwrite a newer job's progress.
    pub async fn advance(&self, task_id: i64, status: TaskStatus) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock().await;
        let current = self.read();
        if current.task_id != Some(task_id) || !current.status.can_transition_to(status) {
            return Err(LedgerError::Stale {
                task_id,
                status,
                current_task: current.task_id,
                current_status: current.status,
            });
        }

        self.persist_and_publish(LedgerEntry {
            task_id: Some(task_id),
            status,
            updated_at: Utc::now(),
        })
        .await
    }

    async fn persist_and_publish(&self, entry: LedgerEntry) -> Result<(), LedgerError> {
        let payload = serde_json::to_vec(&entry)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(task_id = ?entry.task_id, status = %entry.status, "Ledger updated");
        self.state.send_replace(entry);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(
        "Ledger no longer tracks task {task_id} at a phase preceding {status} \
         (current: {current_task:?} {current_status})"
    )]
    Stale {
        task_id: i64,
        status: TaskStatus,
        current_task: Option<i64>,
        current_status: TaskStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_record_starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::open(dir.path().join("state.json")).await.unwrap();

        let entry = ledger.read();
        assert_eq!(entry.task_id, None);
        assert_eq!(entry.status, TaskStatus::Finished);
        assert!(entry.is_idle());
    }

    #[tokio::test]
    async fn test_corrupt_record_starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{\"task_id\": 3, \"status\": \"proces").unwrap();

        let ledger = ProgressLedger::open(&path).await.unwrap();
        assert!(ledger.read().is_idle());
        assert_eq!(ledger.read().task_id, None);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let ledger = ProgressLedger::open(&path).await.unwrap();
        ledger.write(Some(7), TaskStatus::Processing).await.unwrap();
        drop(ledger);

        let reopened = ProgressLedger::open(&path).await.unwrap();
        let entry = reopened.read();
        assert_eq!(entry.task_id, Some(7));
        assert_eq!(entry.status, TaskStatus::Processing);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::open(dir.path().join("state.json")).await.unwrap();
        ledger.write(Some(1), TaskStatus::Uploading).await.unwrap();

        assert_eq!(ledger.read(), ledger.read());
    }

    #[tokio::test]
    async fn test_advance_requires_owner_and_forward_step() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::open(dir.path().join("state.json")).await.unwrap();
        ledger.write(Some(4), TaskStatus::Pending).await.unwrap();

        ledger.advance(4, TaskStatus::Processing).await.unwrap();

        let err = ledger.advance(5, TaskStatus::Uploading).await.unwrap_err();
        assert!(matches!(err, LedgerError::Stale { current_task: Some(4), .. }));

        let err = ledger.advance(4, TaskStatus::Pending).await.unwrap_err();
        assert!(matches!(err, LedgerError::Stale { .. }));

        assert_eq!(ledger.read().status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::open(dir.path().join("state.json")).await.unwrap();
        let mut rx = ledger.subscribe();

        ledger.write(Some(2), TaskStatus::Pending).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().task_id, Some(2));
    }
}
