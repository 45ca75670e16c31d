//! # Service Descriptors
//!
//! A descriptor is one row of the service table: the service's name, its
//! ordered mandatory dependencies, its optional dependencies, the role
//! eligibility predicate, and the factory that constructs the instance.
//!
//! Factories receive mandatory dependencies positionally (in `requires`
//! order) and optional dependencies by name, mirroring how they are declared.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use shared_types::Service;

use crate::error::ServiceGraphError;

/// Role eligibility predicate: may this service run under the given role?
pub type EligibilityFn = fn(shared_types::ProcessRole) -> bool;

/// Constructs a service instance from the process context and its resolved
/// dependencies. Process-level effects (binding sockets, spawning workers)
/// belong in `Service::start`, not here; the builder guarantees the factory
/// runs at most once per name per tree.
pub type ServiceFactory<C> =
    fn(&C, &FactoryArgs) -> Result<Arc<dyn Service>, ServiceGraphError>;

/// One entry of the service table.
pub struct ServiceDescriptor<C> {
    /// Unique service name; the tree keys instances by it.
    pub name: &'static str,
    /// Mandatory dependencies, in the order the factory expects them.
    pub requires: &'static [&'static str],
    /// Optional dependencies; construction failure or ineligibility of one is
    /// tolerated and the argument omitted.
    pub optional: &'static [&'static str],
    /// Role eligibility predicate.
    pub eligible: EligibilityFn,
    /// Instance constructor.
    pub factory: ServiceFactory<C>,
}

impl<C> fmt::Debug for ServiceDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("optional", &self.optional)
            .finish()
    }
}

/// Resolved dependencies handed to a factory.
#[derive(Default)]
pub struct FactoryArgs {
    required: Vec<(&'static str, Arc<dyn Service>)>,
    optional: HashMap<&'static str, Arc<dyn Service>>,
}

impl FactoryArgs {
    pub(crate) fn push_required(&mut self, name: &'static str, service: Arc<dyn Service>) {
        self.required.push((name, service));
    }

    pub(crate) fn push_optional(&mut self, name: &'static str, service: Arc<dyn Service>) {
        self.optional.insert(name, service);
    }

    /// Number of mandatory dependencies resolved.
    #[must_use]
    pub fn required_len(&self) -> usize {
        self.required.len()
    }

    /// Recover the mandatory dependency at `index` (the position in the
    /// descriptor's `requires` list) as its concrete type.
    pub fn require<T: Service>(
        &self,
        owner: &'static str,
        index: usize,
    ) -> Result<Arc<T>, ServiceGraphError> {
        let (name, service) = self.required.get(index).ok_or_else(|| {
            ServiceGraphError::FactoryFailed {
                name: owner.to_string(),
                reason: format!("missing required dependency at position {index}"),
            }
        })?;
        Arc::clone(service)
            .as_any()
            .downcast::<T>()
            .map_err(|_| ServiceGraphError::DependencyType {
                name: owner.to_string(),
                dependency: (*name).to_string(),
            })
    }

    /// Recover an optional dependency by name, if it was built.
    pub fn optional<T: Service>(
        &self,
        owner: &'static str,
        name: &str,
    ) -> Result<Option<Arc<T>>, ServiceGraphError> {
        match self.optional.get(name) {
            None => Ok(None),
            Some(service) => Arc::clone(service)
                .as_any()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| ServiceGraphError::DependencyType {
                    name: owner.to_string(),
                    dependency: name.to_string(),
                }),
        }
    }
}
