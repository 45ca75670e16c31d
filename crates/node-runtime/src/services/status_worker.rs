//! # Status Worker Service
//!
//! Periodically flushes accumulated node status through the task queue, so
//! status writes serialize with every other deferred write instead of racing
//! them.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use shared_types::{Service, ServiceError, ServiceState};

use crate::services::task_queue::TaskQueueService;

/// Periodic status flusher, serialized through the task queue.
pub struct StatusWorkerService {
    interval: Duration,
    queue: Arc<TaskQueueService>,
    flushes: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusWorkerService {
    /// Create a stopped worker flushing every `interval`.
    #[must_use]
    pub fn new(interval: Duration, queue: Arc<TaskQueueService>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            interval,
            queue,
            flushes: Arc::new(AtomicU64::new(0)),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Number of status flushes completed since start.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for StatusWorkerService {
    async fn start(&self) -> Result<(), ServiceError> {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return Err(ServiceError::InvalidState {
                service: "status-worker".to_string(),
                operation: "start",
                state: ServiceState::Running,
            });
        }
        let interval = self.interval;
        let queue = Arc::clone(&self.queue);
        let flushes = Arc::clone(&self.flushes);
        let mut shutdown = self.shutdown.subscribe();
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
                }
                let flushes = Arc::clone(&flushes);
                let deferred = queue.defer(async move {
                    flushes.fetch_add(1, Ordering::SeqCst);
                    debug!("status flushed");
                });
                if deferred.is_err() {
                    debug!("task queue gone; status worker exiting");
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        self.shutdown.send_replace(true);
        let _ = handle.await;
        self.shutdown.send_replace(false);
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
    async fn test_flushes_through_queue() {
        let queue = Arc::new(TaskQueueService::new());
        queue.start().await.unwrap();
        let worker = StatusWorkerService::new(Duration::from_millis(10), Arc::clone(&queue));
        worker.start().await.unwrap();

        for _ in 0..200 {
            if worker.flushes() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(worker.flushes() >= 2);

        worker.stop().await.unwrap();
        queue.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let queue = Arc::new(TaskQueueService::new());
        let worker = StatusWorkerService::new(Duration::from_secs(60), queue);
        worker.stop().await.unwrap();
    }
}
