use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use restormer_service::app_state::AppState;
use restormer_service::config::AppConfig;
use restormer_service::db::{self, queries::TaskStore};
use restormer_service::services::{
    auth::AuthService,
    inference::{HttpRestorer, LocalRestorer, Restorer},
    ledger::ProgressLedger,
    orchestrator::JobOrchestrator,
    queue::job_queue,
    storage::{LocalStore, ObjectStore, S3Store, StorageGateway},
    watchdog::spawn_watchdog,
    worker::spawn_worker,
};

const QUEUE_CAPACITY: usize = 4;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing restoration service");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("restoration_jobs_total", "Restoration jobs accepted");
    metrics::describe_counter!("restoration_jobs_finished", "Restoration jobs finished");
    metrics::describe_counter!("restoration_jobs_failed", "Restoration jobs that failed");
    metrics::describe_counter!(
        "restoration_jobs_rejected",
        "Submissions rejected because a job was in flight"
    );
    metrics::describe_histogram!(
        "restoration_processing_seconds",
        "Time from job start to finished"
    );
    metrics::describe_counter!("storage_writes_total", "Blob writes by backend");
    metrics::describe_counter!(
        "storage_remote_failures_total",
        "Remote storage writes that fell back to local disk"
    );
    metrics::describe_counter!("watchdog_reclaims_total", "Stuck jobs reclaimed by the watchdog");

    // Initialize task store
    tracing::info!(database_url = %config.database_url, "Opening task store");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to open database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");
    let store = TaskStore::new(db_pool);

    // Load progress ledger
    let ledger = ProgressLedger::open(&config.ledger_path)
        .await
        .expect("Failed to open progress ledger");
    let ledger = Arc::new(ledger);

    // Initialize storage gateway
    let static_prefix = format!("/{}", config.static_prefix.trim_matches('/'));
    let remote: Option<Arc<dyn ObjectStore>> = match S3Store::from_config(&config) {
        Ok(Some(store)) => {
            tracing::info!(bucket = ?config.s3_bucket, "Remote object storage enabled");
            Some(Arc::new(store))
        }
        Ok(None) => {
            tracing::info!("No S3 bucket configured, storing blobs locally only");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Invalid S3 configuration, storing blobs locally only");
            None
        }
    };
    let storage = StorageGateway::new(remote, LocalStore::new(&config.storage_dir, &static_prefix));

    // Initialize inference engine
    let restorer: Arc<dyn Restorer> = match &config.restore_endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Using remote inference service");
            Arc::new(HttpRestorer::new(endpoint))
        }
        None => {
            tracing::info!("Using bundled restoration engine");
            Arc::new(LocalRestorer)
        }
    };

    let auth = AuthService::from_config(&config).expect("Invalid authentication configuration");
    if auth.is_none() {
        tracing::warn!("AUTH_SECRET not set, submissions are unauthenticated");
    }

    let (queue, jobs) = job_queue(QUEUE_CAPACITY);
    let orchestrator = Arc::new(JobOrchestrator::new(store, ledger, storage, restorer, queue));

    match orchestrator.recover().await {
        Ok(Some(task_id)) => tracing::warn!(task_id, "Failed job interrupted by previous shutdown"),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Start-up recovery failed"),
    }

    spawn_worker(orchestrator.clone(), jobs);
    spawn_watchdog(
        orchestrator.clone(),
        config.job_timeout(),
        config.watchdog_interval(),
    );

    // Create shared application state
    let state = AppState::new(orchestrator, auth, config.max_file_size_bytes());
    let app = restormer_service::build_router(state, prometheus_handle, &static_prefix);

    tracing::info!("Starting restoration service on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
