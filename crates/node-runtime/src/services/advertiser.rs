//! # Endpoint Advertiser Service
//!
//! The region-side source of the roster: services that accept cluster
//! connections register their reachable addresses here, and the roster web
//! endpoint serves the resulting document. Entries are withdrawn when the
//! owning service stops.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use cluster_rpc::{PeerAddr, Roster};
use shared_types::{EventLoopId, Service, ServiceError};

/// In-process registry of advertised RPC endpoints.
pub struct EndpointAdvertiserService {
    ident: EventLoopId,
    entries: RwLock<Roster>,
}

impl EndpointAdvertiserService {
    /// Create an advertiser for this process.
    #[must_use]
    pub fn new(ident: EventLoopId) -> Self {
        Self {
            ident,
            entries: RwLock::new(Roster::new()),
        }
    }

    /// This process's event-loop identity.
    #[must_use]
    pub fn ident(&self) -> &EventLoopId {
        &self.ident
    }

    /// Advertise one candidate address for `ident`.
    pub fn advertise(&self, ident: &EventLoopId, address: PeerAddr) {
        info!(eventloop = %ident, host = %address.0, port = address.1, "advertising endpoint");
        self.entries.write().advertise(ident.as_str(), address);
    }

    /// Withdraw everything advertised for `ident`.
    pub fn withdraw(&self, ident: &EventLoopId) {
        self.entries.write().eventloops.remove(ident.as_str());
    }

    /// The current roster document.
    #[must_use]
    pub fn roster(&self) -> Roster {
        self.entries.read().clone()
    }
}

#[async_trait]
impl Service for EndpointAdvertiserService {
    async fn start(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.entries.write().eventloops.clear();
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
