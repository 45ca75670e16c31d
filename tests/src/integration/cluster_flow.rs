//! # Cluster Flow
//!
//! Full rack↔region loop over real sockets: a region worker tree serving the
//! roster endpoint and the RPC listener, and a rack agent tree whose
//! discovery loop finds the region over HTTP, upgrades to TLS, verifies the
//! region's identity and registers the connection. Region-side calls then
//! flow back over the same connection.

use std::sync::Arc;
use std::time::Duration;

use cluster_rpc::{calls, ClusterClientService};
use node_runtime::config::NodeConfig;
use node_runtime::context::NodeContext;
use node_runtime::services::{ImageImportService, RosterWebService, RpcService};
use node_runtime::table::service_registry;
use service_graph::{ServiceGraphBuilder, ServiceTree};
use shared_types::{EventLoopId, ProcessRole, Service};

fn region_context() -> Arc<NodeContext> {
    let mut config = NodeConfig::default();
    config.rpc.bind_addr = "127.0.0.1:0".to_string();
    config.web.bind_addr = "127.0.0.1:0".to_string();
    config.status.interval_secs = 1;
    Arc::new(NodeContext::with_ident(
        ProcessRole::RegionWorker,
        EventLoopId::from("region-e2e:pid=1"),
        config,
    ))
}

fn rack_context(region_url: String) -> Arc<NodeContext> {
    let mut config = NodeConfig::default();
    config.discovery.region_url = region_url;
    config.discovery.min_interval_secs = 1;
    config.discovery.max_interval_secs = 1;
    config.discovery.connect_timeout_secs = 2;
    config.import.interval_secs = 3600;
    Arc::new(NodeContext::with_ident(
        ProcessRole::RackAgent,
        EventLoopId::from("rack-e2e:pid=2"),
        config,
    ))
}

fn populate(ctx: &Arc<NodeContext>) -> ServiceTree {
    let registry = service_registry().unwrap();
    let tree = ServiceTree::new();
    ServiceGraphBuilder::new(&registry, ctx.as_ref(), ctx.role)
        .populate_defaults(&tree)
        .unwrap();
    tree
}

fn downcast<T: Service>(tree: &ServiceTree, name: &str) -> Arc<T> {
    tree.get(name)
        .unwrap_or_else(|| panic!("service '{name}' not in tree"))
        .as_any()
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("service '{name}' has unexpected type"))
}

async fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rack_discovers_region_and_serves_calls() {
    // Region worker: rpc + advertiser + web + status plumbing.
    let region_ctx = region_context();
    let region_tree = populate(&region_ctx);
    region_tree.start().await.unwrap();

    let web: Arc<RosterWebService> = downcast(&region_tree, "web");
    let rpc: Arc<RpcService> = downcast(&region_tree, "rpc");
    let web_addr = web.local_addr().unwrap();

    // The roster endpoint is serving the advertised RPC address.
    let roster: serde_json::Value = reqwest::get(format!("http://{web_addr}/rpc/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let advertised = &roster["eventloops"]["region-e2e:pid=1"];
    assert!(advertised.is_array(), "region did not advertise itself: {roster}");

    // Rack agent pointed at the region's web endpoint.
    let rack_ctx = rack_context(format!("http://{web_addr}"));
    let rack_tree = populate(&rack_ctx);
    rack_tree.start().await.unwrap();

    let client_service: Arc<ClusterClientService> = downcast(&rack_tree, "rpc-client");
    let rack_directory = client_service.directory();

    // Discovery connects within a tick or two.
    wait_for("rack to connect to region", || !rack_directory.is_empty()).await;
    let region_client = client_service.get_client().unwrap();
    assert_eq!(region_client.ident().as_str(), "region-e2e:pid=1");

    // The region registered the rack under its identity.
    let region_directory = rpc.directory();
    wait_for("region to register rack", || region_directory.len() == 1).await;
    let rack_client = region_directory
        .client_for(&EventLoopId::from("rack-e2e:pid=2"))
        .unwrap();

    // Region → rack: inventory calls served by the rack's responders. The
    // first import pass fills the inventory shortly after start.
    let import: Arc<ImageImportService> = downcast(&rack_tree, "image-import");
    wait_for("first import pass", || !import.images().is_empty()).await;
    let images = calls::list_boot_images(&rack_client).await.unwrap();
    assert!(!images.is_empty(), "rack reported no boot images");
    let power_types = calls::describe_power_types(&rack_client).await.unwrap();
    assert!(power_types.iter().any(|p| p.name == "ipmi"));

    // Aggregate over every connected rack; no import is running.
    assert!(!calls::is_import_boot_images_running(&region_directory).await);
    let all_images = calls::get_all_available_boot_images(&region_directory).await;
    assert_eq!(all_images, {
        let mut sorted = images.clone();
        sorted.sort();
        sorted
    });

    // Rack → region: report images upstream and find them in the store.
    calls::report_boot_images(&region_client, "rack-e2e-uuid", images)
        .await
        .unwrap();
    assert!(rpc.reports().read().contains_key("rack-e2e-uuid"));

    rack_tree.stop().await.unwrap();
    region_tree.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_region_shutdown_empties_rack_directory() {
    let region_ctx = region_context();
    let region_tree = populate(&region_ctx);
    region_tree.start().await.unwrap();
    let web: Arc<RosterWebService> = downcast(&region_tree, "web");
    let web_addr = web.local_addr().unwrap();

    let rack_ctx = rack_context(format!("http://{web_addr}"));
    let rack_tree = populate(&rack_ctx);
    rack_tree.start().await.unwrap();

    let client_service: Arc<ClusterClientService> = downcast(&rack_tree, "rpc-client");
    let directory = client_service.directory();
    wait_for("rack to connect", || !directory.is_empty()).await;

    // Region goes away: the dead transport is detected and the rack's
    // directory drains without waiting for the next roster tick.
    region_tree.stop().await.unwrap();
    wait_for("rack directory to drain", || directory.is_empty()).await;

    assert!(matches!(
        client_service.get_client(),
        Err(cluster_rpc::RpcError::NoConnectionsAvailable)
    ));

    rack_tree.stop().await.unwrap();
}
