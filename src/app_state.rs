use std::sync::Arc;

use crate::services::{auth::AuthService, orchestrator::JobOrchestrator};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    /// Present only when authentication is configured.
    pub auth: Option<Arc<AuthService>>,
    pub max_file_size: usize,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        auth: Option<AuthService>,
        max_file_size: usize,
    ) -> Self {
        Self {
            orchestrator,
            auth: auth.map(Arc::new),
            max_file_size,
        }
    }
}
