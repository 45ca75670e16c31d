//! # Foundry Node Runtime
//!
//! The entry crate for a control-plane process. A process starts in one of
//! four roles (region master, region worker, all-in-one, rack agent); the
//! role decides, through the service descriptor table, which services are
//! assembled into the process's service tree.
//!
//! ## Modular Structure
//!
//! - `config` - node configuration: defaults, TOML file, env overrides
//! - `context` - the per-process context object passed to service factories
//! - `services` - the concrete service implementations
//! - `responders` - RPC command handlers backed by the services
//! - `table` - the service descriptor table (who runs where, with what)
//! - `bootstrap` - shared startup steps and the per-role entry points
//!
//! ## Startup Sequence
//!
//! 1. Parse role and load configuration
//! 2. Build and validate the service registry
//! 3. Populate the service tree for the role
//! 4. Run the prepare hook, then start all services
//! 5. Wait for shutdown, stop all services

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod responders;
pub mod services;
pub mod table;

pub use config::{ConfigError, NodeConfig};
pub use context::NodeContext;
pub use table::service_registry;
