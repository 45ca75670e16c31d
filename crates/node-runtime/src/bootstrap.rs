//! # Bootstrap
//!
//! Shared startup steps plus one thin entry function per role. Roles differ
//! only in which services the table makes eligible; everything else — the
//! registry, the tree, the prepare hook, the shutdown path — is the same
//! composition of steps.

use std::sync::Arc;

use anyhow::{Context, Result};
use service_graph::{PrepareHook, ServiceGraphBuilder, ServiceTree};
use shared_types::{ProcessRole, ServiceError};
use tracing::{error, info};

use crate::config::NodeConfig;
use crate::context::NodeContext;
use crate::table::service_registry;

/// Build the tree for `ctx`: validated registry, prepare hook, all eligible
/// services populated.
pub fn build_tree(ctx: &Arc<NodeContext>) -> Result<ServiceTree> {
    let registry = service_registry().context("service registry is invalid")?;
    let tree = ServiceTree::with_prepare(prepare_hook(Arc::clone(ctx)));
    let builder = ServiceGraphBuilder::new(&registry, ctx.as_ref(), ctx.role);
    builder
        .populate_defaults(&tree)
        .with_context(|| format!("cannot populate services for role '{}'", ctx.role))?;
    info!(
        role = %ctx.role,
        services = ?tree.service_names(),
        "service tree populated"
    );
    Ok(tree)
}

fn prepare_hook(ctx: Arc<NodeContext>) -> PrepareHook {
    Box::new(move || {
        let ctx = Arc::clone(&ctx);
        Box::pin(async move {
            info!(role = %ctx.role, ident = %ctx.ident, "preparing node");
            ctx.config
                .validate()
                .map_err(|e| ServiceError::start("prepare", e))
        })
    })
}

/// Run a node until shutdown is requested.
pub async fn run(ctx: NodeContext) -> Result<()> {
    let ctx = Arc::new(ctx);
    let tree = build_tree(&ctx)?;

    info!("===========================================");
    info!("  Foundry Node v{}", env!("CARGO_PKG_VERSION"));
    info!("  Role: {}", ctx.role);
    info!("  Event loop: {}", ctx.ident);
    info!("===========================================");

    tree.start()
        .await
        .context("service startup failed; not serving")?;
    info!("all services running");

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for shutdown signal")?;
    info!("shutdown requested");

    if let Err(err) = tree.stop().await {
        error!(error = %err, "error while stopping services");
    }
    Ok(())
}

/// Run the region master role.
pub async fn run_region_master(config: NodeConfig) -> Result<()> {
    run(NodeContext::new(ProcessRole::RegionMaster, config)).await
}

/// Run the region worker role.
pub async fn run_region_worker(config: NodeConfig) -> Result<()> {
    run(NodeContext::new(ProcessRole::RegionWorker, config)).await
}

/// Run the all-in-one role.
pub async fn run_all_in_one(config: NodeConfig) -> Result<()> {
    run(NodeContext::new(ProcessRole::AllInOne, config)).await
}

/// Run the rack agent role.
pub async fn run_rack_agent(config: NodeConfig) -> Result<()> {
    run(NodeContext::new(ProcessRole::RackAgent, config)).await
}
