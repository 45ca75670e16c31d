//! # Service Graph - Dependency-Ordered Service Orchestration
//!
//! This crate assembles the set of background services a control-plane
//! process runs, from a static descriptor table, honoring dependency order
//! and role eligibility.
//!
//! ## How It Works
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ServiceRegistry                          │
//! │   name → { factory, requires, optional, eligible(role) }    │
//! └───────────────┬─────────────────────────────────────────────┘
//!                 │ populate(role, requested)
//!                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ServiceGraphBuilder                        │
//! │   recursive, memoized: each service built exactly once,     │
//! │   mandatory deps first, optional deps best-effort           │
//! └───────────────┬─────────────────────────────────────────────┘
//!                 │ attach
//!                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ServiceTree                            │
//! │   owns instances · prepare hook · concurrent start/stop     │
//! │   Stopped → Starting → Running → Stopping → Stopped         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry is constructed once per process context and never mutated
//! afterwards; the tree is mutated only by populate/start/stop/reset from the
//! orchestrating task. Read accessors are safe from any task.

pub mod builder;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod tree;

pub use builder::ServiceGraphBuilder;
pub use descriptor::{EligibilityFn, FactoryArgs, ServiceDescriptor, ServiceFactory};
pub use error::ServiceGraphError;
pub use registry::ServiceRegistry;
pub use tree::{PrepareHook, ServiceTree};
