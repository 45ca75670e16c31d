//! # Node Context
//!
//! One explicit context object per process, constructed at entry and passed
//! to every service factory. There is no process-wide mutable singleton:
//! tests build a fresh context (and a fresh tree) instead of resetting
//! shared state.

use shared_types::{EventLoopId, ProcessRole};

use crate::config::NodeConfig;

/// Immutable per-process context handed to service factories.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// The role this process was started in.
    pub role: ProcessRole,
    /// This process's event-loop identity.
    pub ident: EventLoopId,
    /// Node configuration.
    pub config: NodeConfig,
}

impl NodeContext {
    /// Build a context with the conventional local identity.
    #[must_use]
    pub fn new(role: ProcessRole, config: NodeConfig) -> Self {
        Self {
            role,
            ident: EventLoopId::local(),
            config,
        }
    }

    /// Build a context with an explicit identity (tests, fixed deployments).
    #[must_use]
    pub fn with_ident(role: ProcessRole, ident: EventLoopId, config: NodeConfig) -> Self {
        Self {
            role,
            ident,
            config,
        }
    }
}
