//! Application state for the HTTP server.

use std::sync::Arc;

use crate::db::repository::FullRepository;
use crate::services::job_tracker::JobTracker;
use crate::services::CacheService;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repository instance for database operations
    pub repository: Arc<dyn FullRepository>,
    /// Cache lifecycle orchestration (per-table action serialization)
    pub cache_service: Arc<CacheService>,
    /// Tracker for background rebuild jobs
    pub job_tracker: JobTracker,
}

impl AppState {
    /// Create a new application state with the given repository.
    pub fn new(repository: Arc<dyn FullRepository>) -> Self {
        let cache_service = Arc::new(CacheService::new(repository.clone()));
        Self {
            repository,
            cache_service,
            job_tracker: JobTracker::new(),
        }
    }
}
