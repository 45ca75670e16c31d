//! # Service Graph Builder
//!
//! Resolves a requested set of service names into a fully
//! dependency-satisfied tree: each service built exactly once (memoized by
//! name within the tree), mandatory dependencies built strictly before their
//! dependents, optional dependencies built best-effort.

use std::sync::Arc;

use shared_types::{ProcessRole, Service};
use tracing::{debug, info};

use crate::descriptor::FactoryArgs;
use crate::error::ServiceGraphError;
use crate::registry::ServiceRegistry;
use crate::tree::ServiceTree;

/// Builds service instances into a tree for one process role.
pub struct ServiceGraphBuilder<'a, C> {
    registry: &'a ServiceRegistry<C>,
    context: &'a C,
    role: ProcessRole,
}

impl<'a, C> ServiceGraphBuilder<'a, C> {
    /// Create a builder over `registry` for `role`.
    pub fn new(registry: &'a ServiceRegistry<C>, context: &'a C, role: ProcessRole) -> Self {
        Self {
            registry,
            context,
            role,
        }
    }

    /// Ensure `tree` contains every service in `requested` plus all
    /// transitive mandatory dependencies.
    ///
    /// Fails fast if a requested service or any mandatory dependency is not
    /// eligible for the builder's role, or if a factory fails. Services built
    /// before the failing one stay attached and remain valid.
    pub fn populate(
        &self,
        tree: &ServiceTree,
        requested: &[&str],
    ) -> Result<(), ServiceGraphError> {
        self.registry.validate()?;
        for name in requested {
            self.build(tree, name)?;
        }
        Ok(())
    }

    /// Ensure every service eligible under the builder's role is in `tree`.
    pub fn populate_defaults(&self, tree: &ServiceTree) -> Result<(), ServiceGraphError> {
        let eligible = self.registry.eligible_names(self.role);
        let names: Vec<&str> = eligible.iter().copied().collect();
        self.populate(tree, &names)
    }

    fn build(
        &self,
        tree: &ServiceTree,
        name: &str,
    ) -> Result<Arc<dyn Service>, ServiceGraphError> {
        let descriptor =
            self.registry
                .get(name)
                .ok_or_else(|| ServiceGraphError::UnknownService {
                    name: name.to_string(),
                })?;

        if !(descriptor.eligible)(self.role) {
            return Err(ServiceGraphError::NotEligibleForRole {
                name: name.to_string(),
                role: self.role,
            });
        }

        // Memoized: one instance per name per tree.
        if let Some(existing) = tree.get(descriptor.name) {
            return Ok(existing);
        }

        let mut args = FactoryArgs::default();
        for dep in descriptor.requires {
            let service = self.build(tree, dep)?;
            args.push_required(dep, service);
        }
        for opt in descriptor.optional {
            match self.build(tree, opt) {
                Ok(service) => args.push_optional(opt, service),
                Err(err) => {
                    debug!(
                        service = descriptor.name,
                        optional = opt,
                        reason = %err,
                        "optional dependency omitted"
                    );
                }
            }
        }

        let service = (descriptor.factory)(self.context, &args)?;
        tree.attach(descriptor.name, Arc::clone(&service))?;
        info!(service = descriptor.name, role = %self.role, "service created");
        Ok(service)
    }
}
