//! # Command Responders
//!
//! The handlers behind the RPC command surface, backed by the node's
//! services. Racks answer the inventory commands; regions accept boot-image
//! reports. Tables are assembled once, at service construction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use cluster_rpc::{
    Architecture, BootImage, CommandKind, CommandResponder, IdentifyResponder, PowerType, Request,
    Response, ResponderTable, RpcError,
};
use shared_types::EventLoopId;

use crate::services::image_import::ImageImportService;

/// Boot-image reports received from racks, keyed by rack UUID.
pub type BootImageReports = Arc<RwLock<HashMap<String, Vec<BootImage>>>>;

/// Answers `ListBootImages` from the rack's local inventory.
pub struct BootImagesResponder {
    import: Arc<ImageImportService>,
}

#[async_trait]
impl CommandResponder for BootImagesResponder {
    async fn respond(&self, _request: Request) -> Result<Response, RpcError> {
        Ok(Response::BootImages {
            images: self.import.images(),
        })
    }
}

/// Answers `IsImportBootImagesRunning` from the import service's flag.
pub struct ImportRunningResponder {
    import: Arc<ImageImportService>,
}

#[async_trait]
impl CommandResponder for ImportRunningResponder {
    async fn respond(&self, _request: Request) -> Result<Response, RpcError> {
        Ok(Response::ImportRunning {
            running: self.import.is_running(),
        })
    }
}

/// Answers `DescribePowerTypes` with the static driver table.
pub struct PowerTypesResponder;

#[async_trait]
impl CommandResponder for PowerTypesResponder {
    async fn respond(&self, _request: Request) -> Result<Response, RpcError> {
        Ok(Response::PowerTypes {
            power_types: vec![
                PowerType {
                    name: "ipmi".to_string(),
                    description: "IPMI".to_string(),
                },
                PowerType {
                    name: "redfish".to_string(),
                    description: "Redfish".to_string(),
                },
                PowerType {
                    name: "manual".to_string(),
                    description: "Manual power control".to_string(),
                },
            ],
        })
    }
}

/// Answers `ListSupportedArchitectures` with the architectures this rack
/// can deploy.
pub struct ArchitecturesResponder;

#[async_trait]
impl CommandResponder for ArchitecturesResponder {
    async fn respond(&self, _request: Request) -> Result<Response, RpcError> {
        Ok(Response::Architectures {
            architectures: vec![
                Architecture {
                    name: "amd64/generic".to_string(),
                    description: "AMD64".to_string(),
                },
                Architecture {
                    name: "arm64/generic".to_string(),
                    description: "ARM64".to_string(),
                },
            ],
        })
    }
}

/// Accepts `ReportBootImages` submissions into the region's report store.
pub struct ReportBootImagesResponder {
    reports: BootImageReports,
}

impl ReportBootImagesResponder {
    pub fn new(reports: BootImageReports) -> Self {
        Self { reports }
    }
}

#[async_trait]
impl CommandResponder for ReportBootImagesResponder {
    async fn respond(&self, request: Request) -> Result<Response, RpcError> {
        match request {
            Request::ReportBootImages { uuid, images } => {
                self.reports.write().insert(uuid, images);
                Ok(Response::Done)
            }
            other => Err(RpcError::UnhandledCommand { kind: other.kind() }),
        }
    }
}

/// The full rack-side responder table.
#[must_use]
pub fn rack_responder_table(
    ident: EventLoopId,
    import: Arc<ImageImportService>,
) -> ResponderTable {
    ResponderTable::new()
        .with(CommandKind::Identify, Arc::new(IdentifyResponder::new(ident)))
        .with(
            CommandKind::ListBootImages,
            Arc::new(BootImagesResponder {
                import: Arc::clone(&import),
            }),
        )
        .with(
            CommandKind::IsImportBootImagesRunning,
            Arc::new(ImportRunningResponder { import }),
        )
        .with(CommandKind::DescribePowerTypes, Arc::new(PowerTypesResponder))
        .with(
            CommandKind::ListSupportedArchitectures,
            Arc::new(ArchitecturesResponder),
        )
}

/// The region-side responder table (identify is installed by the listener).
#[must_use]
pub fn region_responder_table(reports: BootImageReports) -> ResponderTable {
    ResponderTable::new().with(
        CommandKind::ReportBootImages,
        Arc::new(ReportBootImagesResponder::new(reports)),
    )
}
