use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::jobs::JobRegistry;
use crate::store::{ConnectionPool, MemoryRowStore, RowStore};
use crate::stream::StreamExecutor;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    store: MemoryRowStore,
    executor: StreamExecutor,
    jobs: JobRegistry,
    config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(store: MemoryRowStore, config: ServiceConfig) -> Self {
        let pool = ConnectionPool::new(config.store.pool_size, config.store.acquire_timeout());
        let executor = StreamExecutor::new(Arc::new(store.clone()), pool, config.query.clone());
        let jobs = JobRegistry::new(&config.jobs);
        Self { store, executor, jobs, config: Arc::new(config) }
    }

    pub fn store(&self) -> &MemoryRowStore {
        &self.store
    }

    /// The store behind the `RowStore` seam, as used by queries and jobs.
    pub fn row_store(&self) -> Arc<dyn RowStore> {
        Arc::clone(self.executor.store())
    }

    pub fn executor(&self) -> &StreamExecutor {
        &self.executor
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
