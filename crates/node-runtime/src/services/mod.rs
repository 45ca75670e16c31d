//! # Concrete Services
//!
//! The service bodies assembled by the descriptor table. The cluster RPC
//! client and the region RPC listener carry the real protocol machinery
//! (in the `cluster-rpc` crate); the remaining services are
//! lifecycle-faithful workers whose state the RPC responders read.

pub mod advertiser;
pub mod image_import;
pub mod ipc;
pub mod rpc_service;
pub mod status_worker;
pub mod task_queue;
pub mod web;
pub mod worker_pool;

pub use advertiser::EndpointAdvertiserService;
pub use image_import::ImageImportService;
pub use ipc::IpcMasterService;
pub use rpc_service::RpcService;
pub use status_worker::StatusWorkerService;
pub use task_queue::TaskQueueService;
pub use web::RosterWebService;
pub use worker_pool::WorkerPoolService;
