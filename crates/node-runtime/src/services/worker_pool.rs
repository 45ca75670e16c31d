//! # Worker Pool Service
//!
//! Region-master bookkeeping for the pool of region worker processes. The
//! pool tracks desired and active slots; actual process supervision is the
//! platform's concern and reaches this service only through its lifecycle.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use shared_types::{Service, ServiceError};

/// Tracks the region worker slots the master supervises.
pub struct WorkerPoolService {
    desired: usize,
    active: AtomicUsize,
}

impl WorkerPoolService {
    /// Create a pool with `desired` worker slots.
    #[must_use]
    pub fn new(desired: usize) -> Self {
        Self {
            desired,
            active: AtomicUsize::new(0),
        }
    }

    /// Number of currently active worker slots.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for WorkerPoolService {
    async fn start(&self) -> Result<(), ServiceError> {
        self.active.store(self.desired, Ordering::SeqCst);
        info!(workers = self.desired, "worker pool online");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.active.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
