//! # RPC Service
//!
//! The region's RPC listener wired to the endpoint advertiser: when the
//! listener binds, its reachable address is advertised in the roster; when
//! it stops, the advertisement is withdrawn.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use cluster_rpc::{ConnectionDirectory, RegionRpcServer, RegionServerConfig};
use shared_types::{Service, ServiceError};

use crate::context::NodeContext;
use crate::responders::{region_responder_table, BootImageReports};
use crate::services::advertiser::EndpointAdvertiserService;

/// Region RPC listener plus roster advertisement.
pub struct RpcService {
    inner: RegionRpcServer,
    advertiser: Arc<EndpointAdvertiserService>,
    advertise_host: String,
    reports: BootImageReports,
}

impl RpcService {
    /// Build the listener from the node context.
    pub fn new(
        ctx: &NodeContext,
        advertiser: Arc<EndpointAdvertiserService>,
    ) -> Result<Self, ServiceError> {
        let bind_addr = ctx
            .config
            .rpc_bind_addr()
            .map_err(|e| ServiceError::start("rpc", e))?;
        let reports = BootImageReports::default();
        let inner = RegionRpcServer::new(
            ctx.ident.clone(),
            RegionServerConfig { bind_addr },
            region_responder_table(Arc::clone(&reports)),
        )
        .map_err(|e| ServiceError::start("rpc", e))?;
        Ok(Self {
            inner,
            advertiser,
            advertise_host: ctx.config.rpc.advertise_host.clone(),
            reports,
        })
    }

    /// The directory of registered rack connections.
    #[must_use]
    pub fn directory(&self) -> Arc<ConnectionDirectory> {
        self.inner.directory()
    }

    /// Boot-image reports received from racks.
    #[must_use]
    pub fn reports(&self) -> BootImageReports {
        Arc::clone(&self.reports)
    }

    /// The bound listener port, once started.
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        self.inner.local_addr().map(|a| a.port())
    }
}

#[async_trait]
impl Service for RpcService {
    async fn start(&self) -> Result<(), ServiceError> {
        self.inner.start().await?;
        let port = self
            .inner
            .local_addr()
            .map(|a| a.port())
            .ok_or_else(|| ServiceError::start("rpc", "listener reported no address"))?;
        self.advertiser
            .advertise(self.inner.ident(), (self.advertise_host.clone(), port));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        self.advertiser.withdraw(self.inner.ident());
        self.inner.stop().await
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
