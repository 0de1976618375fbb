//! Shared set-up and fakes for integration tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use restormer_service::db::{self, queries::TaskStore};
use restormer_service::models::restoration::RestorationModel;
use restormer_service::models::task::TaskStatus;
use restormer_service::services::inference::{RestoreError, Restorer};
use restormer_service::services::ledger::ProgressLedger;
use restormer_service::services::orchestrator::JobOrchestrator;
use restormer_service::services::queue::job_queue;
use restormer_service::services::storage::{LocalStore, ObjectStore, StorageError, StorageGateway};
use restormer_service::services::worker::spawn_worker;

/// Appends a marker to the input so outputs are recognizable.
pub struct TaggingRestorer;

#[async_trait]
impl Restorer for TaggingRestorer {
    async fn restore(&self, image: &[u8], model: RestorationModel) -> Result<Vec<u8>, RestoreError> {
        Ok(tagged(image, model))
    }
}

pub fn tagged(image: &[u8], model: RestorationModel) -> Vec<u8> {
    let mut out = image.to_vec();
    out.extend_from_slice(format!("|restored:{model}").as_bytes());
    out
}

/// Blocks every restore call until a permit is released.
pub struct GatedRestorer {
    pub gate: Arc<Semaphore>,
}

impl GatedRestorer {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: gate.clone() }, gate)
    }
}

#[async_trait]
impl Restorer for GatedRestorer {
    async fn restore(&self, image: &[u8], model: RestorationModel) -> Result<Vec<u8>, RestoreError> {
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        Ok(tagged(image, model))
    }
}

/// Never returns from its first restore call; later calls succeed.
#[derive(Default)]
pub struct HangOnceRestorer {
    hung: AtomicBool,
}

#[async_trait]
impl Restorer for HangOnceRestorer {
    async fn restore(&self, image: &[u8], model: RestorationModel) -> Result<Vec<u8>, RestoreError> {
        if !self.hung.swap(true, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(tagged(image, model))
    }
}

/// Always reports an engine failure.
pub struct FailingRestorer;

#[async_trait]
impl Restorer for FailingRestorer {
    async fn restore(&self, _: &[u8], _: RestorationModel) -> Result<Vec<u8>, RestoreError> {
        Err(RestoreError::Status {
            status: 500,
            body: "CUDA out of memory".to_string(),
        })
    }
}

/// In-memory object store standing in for a working S3 bucket.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(StorageError::Status(404))
    }

    fn link(&self, key: &str) -> String {
        format!("https://restored.s3.amazonaws.com/{key}")
    }
}

/// Object store whose credentials are always rejected.
pub struct DeniedStore;

#[async_trait]
impl ObjectStore for DeniedStore {
    async fn put(&self, _: &str, _: &[u8], _: &str) -> Result<(), StorageError> {
        Err(StorageError::Status(403))
    }

    async fn get(&self, _: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::Status(403))
    }

    fn link(&self, key: &str) -> String {
        format!("https://denied.s3.amazonaws.com/{key}")
    }
}

pub struct TestHarness {
    pub orchestrator: Arc<JobOrchestrator>,
    pub worker: JoinHandle<()>,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn storage_dir(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.dir.path().join("tasks.db").display())
    }
}

/// Build a full orchestrator with a running worker over a fresh temp directory.
pub async fn harness(
    remote: Option<Arc<dyn ObjectStore>>,
    restorer: Arc<dyn Restorer>,
) -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let (orchestrator, worker) = start_in(dir.path().to_path_buf(), remote, restorer).await;
    TestHarness {
        orchestrator,
        worker,
        dir,
    }
}

/// Start an orchestrator and worker over an existing directory, as a restarted
/// process would.
pub async fn start_in(
    root: PathBuf,
    remote: Option<Arc<dyn ObjectStore>>,
    restorer: Arc<dyn Restorer>,
) -> (Arc<JobOrchestrator>, JoinHandle<()>) {
    let url = format!("sqlite://{}", root.join("tasks.db").display());
    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let ledger = Arc::new(ProgressLedger::open(root.join("state.json")).await.unwrap());
    let storage = StorageGateway::new(remote, LocalStore::new(root.join("storage"), "/static"));
    let (queue, jobs) = job_queue(4);

    let orchestrator = Arc::new(JobOrchestrator::new(
        TaskStore::new(pool),
        ledger,
        storage,
        restorer,
        queue,
    ));
    let worker = spawn_worker(orchestrator.clone(), jobs);
    (orchestrator, worker)
}

/// Wait until the ledger reports `status` for `task_id`.
pub async fn wait_for_ledger(orchestrator: &JobOrchestrator, task_id: i64, status: TaskStatus) {
    let mut rx = orchestrator.ledger().subscribe();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            {
                let entry = rx.borrow_and_update();
                if entry.task_id == Some(task_id) && entry.status == status {
                    return;
                }
            }
            rx.changed().await.expect("ledger dropped");
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "task {task_id} never reached {status}, ledger: {:?}",
            orchestrator.ledger().read()
        )
    });
}
