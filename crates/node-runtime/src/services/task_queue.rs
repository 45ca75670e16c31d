//! # Task Queue Service
//!
//! A serial background task runner: deferred work is queued and executed one
//! task at a time on a single worker. Stopping the service drains whatever
//! is already queued before the worker exits.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use shared_types::{Service, ServiceError, ServiceState};

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Serial deferred-task runner.
pub struct TaskQueueService {
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    completed: Arc<AtomicU64>,
}

impl Default for TaskQueueService {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueueService {
    /// Create a stopped queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
            worker: Mutex::new(None),
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a task for serial execution.
    pub fn defer<F>(&self, task: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) if sender.send(Box::pin(task)).is_ok() => Ok(()),
            _ => Err(ServiceError::InvalidState {
                service: "task-queue".to_string(),
                operation: "defer",
                state: ServiceState::Stopped,
            }),
        }
    }

    /// Number of tasks completed since start.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for TaskQueueService {
    async fn start(&self) -> Result<(), ServiceError> {
        let mut sender = self.sender.lock();
        if sender.is_some() {
            return Err(ServiceError::InvalidState {
                service: "task-queue".to_string(),
                operation: "start",
                state: ServiceState::Running,
            });
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let completed = Arc::clone(&self.completed);
        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task.await;
                completed.fetch_add(1, Ordering::SeqCst);
            }
            debug!("task queue drained");
        });
        *sender = Some(tx);
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        // Dropping the sender lets the worker drain the queue and exit.
        self.sender.lock().take();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| ServiceError::stop("task-queue", e))?;
        }
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
