//! # Image Import Service
//!
//! Rack-side boot-image maintenance: a periodic import pass refreshes the
//! local image inventory, and an in-progress flag backs the
//! `IsImportBootImagesRunning` responder. The first pass runs immediately at
//! start so a fresh rack has an inventory to report.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use cluster_rpc::BootImage;
use shared_types::{Service, ServiceError, ServiceState};

/// The image set a default import pass provides.
fn default_image_set() -> Vec<BootImage> {
    ["noble", "jammy"]
        .into_iter()
        .flat_map(|release| {
            ["commissioning", "deploy"].into_iter().map(move |purpose| BootImage {
                osystem: "ubuntu".to_string(),
                architecture: "amd64".to_string(),
                subarchitecture: "generic".to_string(),
                release: release.to_string(),
                label: "stable".to_string(),
                purpose: purpose.to_string(),
            })
        })
        .collect()
}

/// Rack-side boot-image inventory and import driver.
pub struct ImageImportService {
    interval: Duration,
    images: Arc<RwLock<Vec<BootImage>>>,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ImageImportService {
    /// Create a stopped import service with an empty inventory.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            interval,
            images: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// The current local image inventory.
    #[must_use]
    pub fn images(&self) -> Vec<BootImage> {
        self.images.read().clone()
    }

    /// Whether an import pass is in progress right now.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn import_pass(images: &RwLock<Vec<BootImage>>, running: &AtomicBool) {
    running.store(true, Ordering::SeqCst);
    debug!("import pass started");
    let imported = default_image_set();
    // Yield so the in-progress flag is observable over RPC.
    tokio::task::yield_now().await;
    let count = imported.len();
    *images.write() = imported;
    running.store(false, Ordering::SeqCst);
    info!(images = count, "import pass finished");
}

#[async_trait]
impl Service for ImageImportService {
    async fn start(&self) -> Result<(), ServiceError> {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return Err(ServiceError::InvalidState {
                service: "image-import".to_string(),
                operation: "start",
                state: ServiceState::Running,
            });
        }
        let interval = self.interval;
        let images = Arc::clone(&self.images);
        let running = Arc::clone(&self.running);
        let mut shutdown = self.shutdown.subscribe();
        *slot = Some(tokio::spawn(async move {
            loop {
                import_pass(&images, &running).await;
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
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
