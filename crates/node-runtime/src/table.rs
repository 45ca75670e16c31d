//! # Service Descriptor Table
//!
//! The single table declaring every orchestrable service: its factory, its
//! dependencies (mandatory ordered, optional named) and the roles it may run
//! under. `populate` walks this table to assemble a process's tree.
//!
//! | name          | roles                          | requires      | optional      |
//! |---------------|--------------------------------|---------------|---------------|
//! | task-queue    | region (all)                   |               |               |
//! | status-worker | region worker, all-in-one      | task-queue    |               |
//! | rpc-advertise | region worker, all-in-one      |               |               |
//! | rpc           | region worker, all-in-one      | rpc-advertise |               |
//! | web           | region worker, all-in-one      | rpc-advertise | status-worker |
//! | worker-pool   | region master only             |               |               |
//! | ipc-master    | region master, all-in-one      |               | worker-pool   |
//! | image-import  | rack agent, all-in-one         |               |               |
//! | rpc-client    | rack agent, all-in-one         | image-import  |               |

use std::sync::Arc;
use std::time::Duration;

use cluster_rpc::ClusterClientService;
use service_graph::{FactoryArgs, ServiceDescriptor, ServiceGraphError, ServiceRegistry};
use shared_types::{ProcessRole, Service};

use crate::context::NodeContext;
use crate::responders::rack_responder_table;
use crate::services::{
    EndpointAdvertiserService, ImageImportService, IpcMasterService, RosterWebService, RpcService,
    StatusWorkerService, TaskQueueService, WorkerPoolService,
};

fn region_any(role: ProcessRole) -> bool {
    role.is_region()
}

fn region_worker_or_all_in_one(role: ProcessRole) -> bool {
    matches!(role, ProcessRole::RegionWorker | ProcessRole::AllInOne)
}

fn master_only(role: ProcessRole) -> bool {
    role == ProcessRole::RegionMaster
}

fn master_or_all_in_one(role: ProcessRole) -> bool {
    matches!(role, ProcessRole::RegionMaster | ProcessRole::AllInOne)
}

fn rack_side(role: ProcessRole) -> bool {
    role.is_rack()
}

fn make_task_queue(
    _ctx: &NodeContext,
    _args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    Ok(Arc::new(TaskQueueService::new()))
}

fn make_status_worker(
    ctx: &NodeContext,
    args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    let queue = args.require::<TaskQueueService>("status-worker", 0)?;
    Ok(Arc::new(StatusWorkerService::new(
        Duration::from_secs(ctx.config.status.interval_secs),
        queue,
    )))
}

fn make_advertiser(
    ctx: &NodeContext,
    _args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    Ok(Arc::new(EndpointAdvertiserService::new(ctx.ident.clone())))
}

fn make_rpc(
    ctx: &NodeContext,
    args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    let advertiser = args.require::<EndpointAdvertiserService>("rpc", 0)?;
    let service =
        RpcService::new(ctx, advertiser).map_err(|e| ServiceGraphError::factory("rpc", e))?;
    Ok(Arc::new(service))
}

fn make_web(
    ctx: &NodeContext,
    args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    let advertiser = args.require::<EndpointAdvertiserService>("web", 0)?;
    let status = args.optional::<StatusWorkerService>("web", "status-worker")?;
    let bind_addr = ctx
        .config
        .web_bind_addr()
        .map_err(|e| ServiceGraphError::factory("web", e))?;
    Ok(Arc::new(RosterWebService::new(bind_addr, advertiser, status)))
}

fn make_worker_pool(
    ctx: &NodeContext,
    _args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    Ok(Arc::new(WorkerPoolService::new(ctx.config.workers.count)))
}

fn make_ipc_master(
    _ctx: &NodeContext,
    args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    let workers = args.optional::<WorkerPoolService>("ipc-master", "worker-pool")?;
    Ok(Arc::new(IpcMasterService::new(workers)))
}

fn make_image_import(
    ctx: &NodeContext,
    _args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    Ok(Arc::new(ImageImportService::new(Duration::from_secs(
        ctx.config.import.interval_secs,
    ))))
}

fn make_rpc_client(
    ctx: &NodeContext,
    args: &FactoryArgs,
) -> Result<Arc<dyn Service>, ServiceGraphError> {
    let import = args.require::<ImageImportService>("rpc-client", 0)?;
    let responders = rack_responder_table(ctx.ident.clone(), import);
    let service = ClusterClientService::new(ctx.config.discovery_config(), responders)
        .map_err(|e| ServiceGraphError::factory("rpc-client", e))?;
    Ok(Arc::new(service))
}

/// Build the full service registry.
pub fn service_registry() -> Result<ServiceRegistry<NodeContext>, ServiceGraphError> {
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDescriptor {
        name: "task-queue",
        requires: &[],
        optional: &[],
        eligible: region_any,
        factory: make_task_queue,
    })?;
    registry.register(ServiceDescriptor {
        name: "status-worker",
        requires: &["task-queue"],
        optional: &[],
        eligible: region_worker_or_all_in_one,
        factory: make_status_worker,
    })?;
    registry.register(ServiceDescriptor {
        name: "rpc-advertise",
        requires: &[],
        optional: &[],
        eligible: region_worker_or_all_in_one,
        factory: make_advertiser,
    })?;
    registry.register(ServiceDescriptor {
        name: "rpc",
        requires: &["rpc-advertise"],
        optional: &[],
        eligible: region_worker_or_all_in_one,
        factory: make_rpc,
    })?;
    registry.register(ServiceDescriptor {
        name: "web",
        requires: &["rpc-advertise"],
        optional: &["status-worker"],
        eligible: region_worker_or_all_in_one,
        factory: make_web,
    })?;
    registry.register(ServiceDescriptor {
        name: "worker-pool",
        requires: &[],
        optional: &[],
        eligible: master_only,
        factory: make_worker_pool,
    })?;
    registry.register(ServiceDescriptor {
        name: "ipc-master",
        requires: &[],
        optional: &["worker-pool"],
        eligible: master_or_all_in_one,
        factory: make_ipc_master,
    })?;
    registry.register(ServiceDescriptor {
        name: "image-import",
        requires: &[],
        optional: &[],
        eligible: rack_side,
        factory: make_image_import,
    })?;
    registry.register(ServiceDescriptor {
        name: "rpc-client",
        requires: &["image-import"],
        optional: &[],
        eligible: rack_side,
        factory: make_rpc_client,
    })?;
    registry.validate()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use service_graph::{ServiceGraphBuilder, ServiceTree};
    use shared_types::EventLoopId;

    fn test_context(role: ProcessRole) -> NodeContext {
        let mut config = NodeConfig::default();
        config.rpc.bind_addr = "127.0.0.1:0".to_string();
        config.web.bind_addr = "127.0.0.1:0".to_string();
        NodeContext::with_ident(role, EventLoopId::from("test:pid=1"), config)
    }

    #[test]
    fn test_registry_is_valid() {
        service_registry().unwrap();
    }

    #[test]
    fn test_rack_agent_gets_rack_services_only() {
        let registry = service_registry().unwrap();
        let ctx = test_context(ProcessRole::RackAgent);
        let tree = ServiceTree::new();
        let builder = ServiceGraphBuilder::new(&registry, &ctx, ProcessRole::RackAgent);
        builder.populate_defaults(&tree).unwrap();
        assert_eq!(tree.service_names(), vec!["image-import", "rpc-client"]);
    }

    #[test]
    fn test_region_worker_tree_shape() {
        let registry = service_registry().unwrap();
        let ctx = test_context(ProcessRole::RegionWorker);
        let tree = ServiceTree::new();
        let builder = ServiceGraphBuilder::new(&registry, &ctx, ProcessRole::RegionWorker);
        builder.populate_defaults(&tree).unwrap();
        let names = tree.service_names();
        assert!(names.contains(&"rpc"));
        assert!(names.contains(&"web"));
        assert!(names.contains(&"rpc-advertise"));
        assert!(!names.contains(&"rpc-client"));
        assert!(!names.contains(&"worker-pool"));
        // Dependencies come before dependents in attach order.
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("rpc-advertise") < pos("rpc"));
        assert!(pos("task-queue") < pos("status-worker"));
    }

    #[test]
    fn test_master_gets_worker_pool_all_in_one_does_not() {
        let registry = service_registry().unwrap();

        let ctx = test_context(ProcessRole::RegionMaster);
        let tree = ServiceTree::new();
        ServiceGraphBuilder::new(&registry, &ctx, ProcessRole::RegionMaster)
            .populate(&tree, &["ipc-master"])
            .unwrap();
        assert!(tree.get("worker-pool").is_some());

        let ctx = test_context(ProcessRole::AllInOne);
        let tree = ServiceTree::new();
        ServiceGraphBuilder::new(&registry, &ctx, ProcessRole::AllInOne)
            .populate(&tree, &["ipc-master"])
            .unwrap();
        // The optional dependency is ineligible in all-in-one and omitted.
        assert!(tree.get("worker-pool").is_none());
        assert!(tree.get("ipc-master").is_some());
    }

    #[test]
    fn test_rack_service_request_on_region_fails() {
        let registry = service_registry().unwrap();
        let ctx = test_context(ProcessRole::RegionWorker);
        let tree = ServiceTree::new();
        let err = ServiceGraphBuilder::new(&registry, &ctx, ProcessRole::RegionWorker)
            .populate(&tree, &["rpc-client"])
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceGraphError::NotEligibleForRole { .. }
        ));
    }
}
