//! # IPC Master Service
//!
//! The master-side endpoint of the master/worker control channel. When the
//! worker pool runs in the same process (a plain region master), the pool is
//! wired in as an optional dependency; in the all-in-one role there is no
//! pool and the service runs without it.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use shared_types::{Service, ServiceError};

use crate::services::worker_pool::WorkerPoolService;

/// Master endpoint of the worker control channel.
pub struct IpcMasterService {
    workers: Option<Arc<WorkerPoolService>>,
}

impl IpcMasterService {
    /// Create the service, optionally bound to a worker pool.
    #[must_use]
    pub fn new(workers: Option<Arc<WorkerPoolService>>) -> Self {
        Self { workers }
    }

    /// Whether a worker pool is wired in.
    #[must_use]
    pub fn has_worker_pool(&self) -> bool {
        self.workers.is_some()
    }
}

#[async_trait]
impl Service for IpcMasterService {
    async fn start(&self) -> Result<(), ServiceError> {
        match &self.workers {
            Some(pool) => info!(workers = pool.worker_count(), "IPC master online"),
            None => info!("IPC master online (no worker pool)"),
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_with_and_without_pool() {
        let bare = IpcMasterService::new(None);
        assert!(!bare.has_worker_pool());
        bare.start().await.unwrap();
        bare.stop().await.unwrap();

        let pooled = IpcMasterService::new(Some(Arc::new(WorkerPoolService::new(2))));
        assert!(pooled.has_worker_pool());
        pooled.start().await.unwrap();
    }
}
