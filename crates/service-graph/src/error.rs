//! # Service Graph Errors
//!
//! Construction errors are fatal to the populate call that triggered them: a
//! process must not start serving with a partially satisfied dependency
//! graph. Lifecycle errors carry the failing service's own report.

use shared_types::{ProcessRole, ServiceError, ServiceState};
use thiserror::Error;

/// Errors raised while building or operating the service tree.
#[derive(Debug, Clone, Error)]
pub enum ServiceGraphError {
    /// A requested service or mandatory dependency is not eligible for the
    /// process role.
    #[error("service '{name}' cannot be created because it is not eligible to run under role '{role}'")]
    NotEligibleForRole { name: String, role: ProcessRole },

    /// A requested name is not present in the registry.
    #[error("unknown service '{name}'")]
    UnknownService { name: String },

    /// A descriptor references a dependency name missing from the registry.
    #[error("service '{name}' depends on unknown service '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    /// The dependency graph is cyclic.
    #[error("dependency cycle detected at service '{name}'")]
    DependencyCycle { name: String },

    /// Two descriptors were registered under the same name.
    #[error("service '{name}' is already registered")]
    DuplicateService { name: String },

    /// A service was attached twice to the same tree.
    #[error("service '{name}' is already attached to the tree")]
    AlreadyAttached { name: String },

    /// A factory rejected its arguments or failed its process-level effects.
    #[error("factory for service '{name}' failed: {reason}")]
    FactoryFailed { name: String, reason: String },

    /// A dependency was built but is not of the type the factory expects.
    #[error("dependency '{dependency}' of service '{name}' has an unexpected concrete type")]
    DependencyType { name: String, dependency: String },

    /// A tree-level operation was attempted in the wrong lifecycle state.
    #[error("service tree cannot {operation} while {state}")]
    InvalidTreeState {
        operation: &'static str,
        state: ServiceState,
    },

    /// A child service reported a lifecycle failure.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ServiceGraphError {
    /// Factory failure with a formatted reason.
    pub fn factory(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FactoryFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}
