//! # Service Graph Scenarios
//!
//! The real service table assembled per role, plus lifecycle paths that span
//! populate → start → stop → reset → populate.

use std::sync::Arc;

use node_runtime::config::NodeConfig;
use node_runtime::context::NodeContext;
use node_runtime::table::service_registry;
use service_graph::{ServiceGraphBuilder, ServiceGraphError, ServiceTree};
use shared_types::{EventLoopId, ProcessRole, ServiceState};

fn context(role: ProcessRole) -> Arc<NodeContext> {
    let mut config = NodeConfig::default();
    config.rpc.bind_addr = "127.0.0.1:0".to_string();
    config.web.bind_addr = "127.0.0.1:0".to_string();
    Arc::new(NodeContext::with_ident(
        role,
        EventLoopId::from("graph-test:pid=1"),
        config,
    ))
}

#[test]
fn test_every_role_populates_cleanly() {
    let registry = service_registry().unwrap();
    for role in ProcessRole::ALL {
        let ctx = context(role);
        let tree = ServiceTree::new();
        ServiceGraphBuilder::new(&registry, ctx.as_ref(), role)
            .populate_defaults(&tree)
            .unwrap_or_else(|e| panic!("populate failed for {role}: {e}"));
        assert!(!tree.is_empty(), "role {role} built no services");
    }
}

#[test]
fn test_master_only_service_rejected_elsewhere() {
    let registry = service_registry().unwrap();
    for role in [
        ProcessRole::RegionWorker,
        ProcessRole::AllInOne,
        ProcessRole::RackAgent,
    ] {
        let ctx = context(role);
        let tree = ServiceTree::new();
        let err = ServiceGraphBuilder::new(&registry, ctx.as_ref(), role)
            .populate(&tree, &["worker-pool"])
            .unwrap_err();
        assert!(
            matches!(err, ServiceGraphError::NotEligibleForRole { .. }),
            "expected eligibility error for {role}, got {err}"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reset_allows_clean_repopulate() {
    let registry = service_registry().unwrap();
    let ctx = context(ProcessRole::RegionWorker);
    let tree = ServiceTree::new();
    let builder = ServiceGraphBuilder::new(&registry, ctx.as_ref(), ProcessRole::RegionWorker);

    builder.populate_defaults(&tree).unwrap();
    tree.start().await.unwrap();
    assert_eq!(tree.state(), ServiceState::Running);

    // Reset stops everything and detaches; populate then starts clean.
    tree.reset().await.unwrap();
    assert!(tree.is_empty());

    builder.populate_defaults(&tree).unwrap();
    assert!(!tree.is_empty());
    tree.start().await.unwrap();
    tree.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_all_in_one_runs_region_and_rack_sides() {
    let registry = service_registry().unwrap();
    let ctx = context(ProcessRole::AllInOne);
    let tree = ServiceTree::new();
    ServiceGraphBuilder::new(&registry, ctx.as_ref(), ProcessRole::AllInOne)
        .populate_defaults(&tree)
        .unwrap();

    let names = tree.service_names();
    assert!(names.contains(&"rpc"));
    assert!(names.contains(&"rpc-client"));
    assert!(names.contains(&"ipc-master"));
    assert!(!names.contains(&"worker-pool"));

    tree.start().await.unwrap();
    tree.stop().await.unwrap();
}
