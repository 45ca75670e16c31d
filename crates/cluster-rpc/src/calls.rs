//! # Typed Call Wrappers and Aggregates
//!
//! Thin wrappers that invoke one command on one connection and unpack the
//! typed response, plus aggregate queries that fan out over every current
//! connection. Aggregates isolate per-peer failures: an unreachable or
//! misbehaving peer contributes nothing and never aborts the whole query.

use futures::future::join_all;
use shared_types::EventLoopId;
use tracing::debug;

use crate::commands::{Architecture, BootImage, CommandKind, PowerType, Request, Response};
use crate::connection::Client;
use crate::directory::ConnectionDirectory;
use crate::error::RpcError;

/// Ask the peer for its event-loop identity.
pub async fn identify(client: &Client) -> Result<EventLoopId, RpcError> {
    match client.call(Request::Identify).await? {
        Response::Identify { ident } => Ok(ident),
        _ => Err(RpcError::UnexpectedResponse {
            command: CommandKind::Identify,
        }),
    }
}

/// List the boot images present on the rack.
pub async fn list_boot_images(client: &Client) -> Result<Vec<BootImage>, RpcError> {
    match client.call(Request::ListBootImages).await? {
        Response::BootImages { images } => Ok(images),
        _ => Err(RpcError::UnexpectedResponse {
            command: CommandKind::ListBootImages,
        }),
    }
}

/// Describe the power drivers the rack supports.
pub async fn describe_power_types(client: &Client) -> Result<Vec<PowerType>, RpcError> {
    match client.call(Request::DescribePowerTypes).await? {
        Response::PowerTypes { power_types } => Ok(power_types),
        _ => Err(RpcError::UnexpectedResponse {
            command: CommandKind::DescribePowerTypes,
        }),
    }
}

/// List the architectures the rack can deploy.
pub async fn list_supported_architectures(client: &Client) -> Result<Vec<Architecture>, RpcError> {
    match client.call(Request::ListSupportedArchitectures).await? {
        Response::Architectures { architectures } => Ok(architectures),
        _ => Err(RpcError::UnexpectedResponse {
            command: CommandKind::ListSupportedArchitectures,
        }),
    }
}

/// Is the rack currently importing boot images?
pub async fn is_import_running(client: &Client) -> Result<bool, RpcError> {
    match client.call(Request::IsImportBootImagesRunning).await? {
        Response::ImportRunning { running } => Ok(running),
        _ => Err(RpcError::UnexpectedResponse {
            command: CommandKind::IsImportBootImagesRunning,
        }),
    }
}

/// Report this rack's boot images to the region.
pub async fn report_boot_images(
    client: &Client,
    uuid: impl Into<String>,
    images: Vec<BootImage>,
) -> Result<(), RpcError> {
    match client
        .call(Request::ReportBootImages {
            uuid: uuid.into(),
            images,
        })
        .await?
    {
        Response::Done => Ok(()),
        _ => Err(RpcError::UnexpectedResponse {
            command: CommandKind::ReportBootImages,
        }),
    }
}

/// True if at least one reachable peer reports an import in progress.
///
/// A peer that fails (connection lost, responder error, anything) counts as
/// "not importing" and the aggregate continues with the rest.
pub async fn is_import_boot_images_running(directory: &ConnectionDirectory) -> bool {
    let clients = directory.all_clients();
    let answers = join_all(clients.iter().map(is_import_running)).await;
    answers
        .into_iter()
        .zip(clients.iter())
        .map(|(answer, client)| match answer {
            Ok(running) => running,
            Err(err) => {
                debug!(eventloop = %client.ident(), error = %err, "peer excluded from import aggregate");
                false
            }
        })
        .any(|running| running)
}

/// The union of boot images across all reachable peers, sorted and deduped.
/// Failed peers contribute nothing.
pub async fn get_all_available_boot_images(directory: &ConnectionDirectory) -> Vec<BootImage> {
    let clients = directory.all_clients();
    let answers = join_all(clients.iter().map(list_boot_images)).await;
    let mut images: Vec<BootImage> = answers
        .into_iter()
        .zip(clients.iter())
        .flat_map(|(answer, client)| match answer {
            Ok(images) => images,
            Err(err) => {
                debug!(eventloop = %client.ident(), error = %err, "peer excluded from image aggregate");
                Vec::new()
            }
        })
        .collect();
    images.sort();
    images.dedup();
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::spawn_connection;
    use crate::responder::{CommandResponder, IdentifyResponder, ResponderTable};
    use async_trait::async_trait;
    use std::sync::Arc;
    use uuid::Uuid;

    struct StaticImport {
        running: bool,
    }

    #[async_trait]
    impl CommandResponder for StaticImport {
        async fn respond(&self, _request: Request) -> Result<Response, RpcError> {
            Ok(Response::ImportRunning {
                running: self.running,
            })
        }
    }

    struct StaticImages {
        images: Vec<BootImage>,
    }

    #[async_trait]
    impl CommandResponder for StaticImages {
        async fn respond(&self, _request: Request) -> Result<Response, RpcError> {
            Ok(Response::BootImages {
                images: self.images.clone(),
            })
        }
    }

    fn image(release: &str) -> BootImage {
        BootImage {
            osystem: "ubuntu".into(),
            architecture: "amd64".into(),
            subarchitecture: "generic".into(),
            release: release.into(),
            label: "stable".into(),
            purpose: "deploy".into(),
        }
    }

    /// Wire up a region-side client whose peer answers with `table`.
    fn peer(ident: &str, table: ResponderTable) -> Client {
        let (region_side, rack_side) = tokio::io::duplex(4096);
        // The rack end of the pair. Dropping the last handle would close the
        // connection, so keep it alive for the whole test process.
        let rack = spawn_connection(
            rack_side,
            EventLoopId::from("region-a:pid=1"),
            ("127.0.0.1".to_string(), 0),
            Uuid::new_v4(),
            Arc::new(table),
            || {},
        );
        std::mem::forget(rack);
        // The region end, through which aggregates call the rack.
        spawn_connection(
            region_side,
            EventLoopId::from(ident),
            ("127.0.0.1".to_string(), 0),
            Uuid::new_v4(),
            Arc::new(ResponderTable::new().with(
                CommandKind::Identify,
                Arc::new(IdentifyResponder::new(EventLoopId::from("region-a:pid=1"))),
            )),
            || {},
        )
    }

    #[tokio::test]
    async fn test_import_aggregate_true_despite_failing_peers() {
        let directory = ConnectionDirectory::new();
        directory
            .register(peer(
                "rack-1",
                ResponderTable::new().with(
                    CommandKind::IsImportBootImagesRunning,
                    Arc::new(StaticImport { running: true }),
                ),
            ))
            .unwrap();
        directory
            .register(peer(
                "rack-2",
                ResponderTable::new().with(
                    CommandKind::IsImportBootImagesRunning,
                    Arc::new(StaticImport { running: false }),
                ),
            ))
            .unwrap();
        // rack-3 has no responder for the command: its answer is a failure.
        directory.register(peer("rack-3", ResponderTable::new())).unwrap();

        assert!(is_import_boot_images_running(&directory).await);
    }

    #[tokio::test]
    async fn test_import_aggregate_false_when_all_false_or_failing() {
        let directory = ConnectionDirectory::new();
        directory
            .register(peer(
                "rack-1",
                ResponderTable::new().with(
                    CommandKind::IsImportBootImagesRunning,
                    Arc::new(StaticImport { running: false }),
                ),
            ))
            .unwrap();
        directory.register(peer("rack-2", ResponderTable::new())).unwrap();

        assert!(!is_import_boot_images_running(&directory).await);
    }

    #[tokio::test]
    async fn test_image_aggregate_unions_and_dedupes() {
        let directory = ConnectionDirectory::new();
        directory
            .register(peer(
                "rack-1",
                ResponderTable::new().with(
                    CommandKind::ListBootImages,
                    Arc::new(StaticImages {
                        images: vec![image("noble"), image("jammy")],
                    }),
                ),
            ))
            .unwrap();
        directory
            .register(peer(
                "rack-2",
                ResponderTable::new().with(
                    CommandKind::ListBootImages,
                    Arc::new(StaticImages {
                        images: vec![image("jammy")],
                    }),
                ),
            ))
            .unwrap();
        // A peer with no handler contributes nothing.
        directory.register(peer("rack-3", ResponderTable::new())).unwrap();

        let images = get_all_available_boot_images(&directory).await;
        let releases: Vec<&str> = images.iter().map(|i| i.release.as_str()).collect();
        assert_eq!(releases, vec!["jammy", "noble"]);
    }

    #[tokio::test]
    async fn test_typed_wrapper_rejects_wrong_variant() {
        // A confused peer answers ListBootImages to everything.
        let client = peer(
            "rack-1",
            ResponderTable::new().with(
                CommandKind::Identify,
                Arc::new(StaticImages { images: vec![] }),
            ),
        );
        let err = identify(&client).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::UnexpectedResponse {
                command: CommandKind::Identify
            }
        ));
    }
}
