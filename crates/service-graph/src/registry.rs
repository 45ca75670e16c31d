//! # Service Registry
//!
//! The static table of service descriptors for one process context. Built
//! once at startup, validated (known names, acyclic graph), then only read.

use std::collections::HashMap;

use shared_types::ProcessRole;

use crate::descriptor::ServiceDescriptor;
use crate::error::ServiceGraphError;

/// Mapping from service name to descriptor.
pub struct ServiceRegistry<C> {
    table: HashMap<&'static str, ServiceDescriptor<C>>,
}

impl<C> Default for ServiceRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ServiceRegistry<C> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register a descriptor. Names must be unique.
    pub fn register(
        &mut self,
        descriptor: ServiceDescriptor<C>,
    ) -> Result<(), ServiceGraphError> {
        if self.table.contains_key(descriptor.name) {
            return Err(ServiceGraphError::DuplicateService {
                name: descriptor.name.to_string(),
            });
        }
        self.table.insert(descriptor.name, descriptor);
        Ok(())
    }

    /// Look up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor<C>> {
        self.table.get(name)
    }

    /// All registered names, sorted for deterministic iteration.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.table.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Names of every service eligible under `role`, sorted.
    #[must_use]
    pub fn eligible_names(&self, role: ProcessRole) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .table
            .values()
            .filter(|d| (d.eligible)(role))
            .map(|d| d.name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Validate the whole table: every referenced dependency exists and the
    /// dependency graph (mandatory and optional edges alike) is acyclic.
    pub fn validate(&self) -> Result<(), ServiceGraphError> {
        for descriptor in self.table.values() {
            for dep in descriptor.dependency_names() {
                if !self.table.contains_key(dep) {
                    return Err(ServiceGraphError::UnknownDependency {
                        name: descriptor.name.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        // Iterative DFS with colors: 0 = unvisited, 1 = on stack, 2 = done.
        let mut color: HashMap<&str, u8> = HashMap::new();
        for &start in self.table.keys() {
            if color.get(start).copied().unwrap_or(0) != 0 {
                continue;
            }
            let mut stack: Vec<(&'static str, usize)> = vec![(start, 0)];
            color.insert(start, 1);
            while let Some(top) = stack.last_mut() {
                let (name, edge) = (top.0, top.1);
                let deps = self.table[name].dependency_names();
                if edge >= deps.len() {
                    color.insert(name, 2);
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let next = deps[edge];
                match color.get(next).copied().unwrap_or(0) {
                    0 => {
                        color.insert(next, 1);
                        stack.push((next, 0));
                    }
                    1 => {
                        return Err(ServiceGraphError::DependencyCycle {
                            name: next.to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

impl<C> ServiceDescriptor<C> {
    /// Mandatory then optional dependency names.
    pub(crate) fn dependency_names(&self) -> Vec<&'static str> {
        self.requires
            .iter()
            .chain(self.optional.iter())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FactoryArgs;
    use async_trait::async_trait;
    use shared_types::{Service, ServiceError};
    use std::any::Any;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl Service for Noop {
        async fn start(&self) -> Result<(), ServiceError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ServiceError> {
            Ok(())
        }
        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn noop_factory(
        _ctx: &(),
        _args: &FactoryArgs,
    ) -> Result<Arc<dyn Service>, ServiceGraphError> {
        Ok(Arc::new(Noop))
    }

    fn descriptor(
        name: &'static str,
        requires: &'static [&'static str],
        optional: &'static [&'static str],
    ) -> ServiceDescriptor<()> {
        ServiceDescriptor {
            name,
            requires,
            optional,
            eligible: |_| true,
            factory: noop_factory,
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ServiceRegistry::new();
        registry.register(descriptor("a", &[], &[])).unwrap();
        let err = registry.register(descriptor("a", &[], &[])).unwrap_err();
        assert!(matches!(err, ServiceGraphError::DuplicateService { .. }));
    }

    #[test]
    fn test_validate_accepts_dag() {
        let mut registry = ServiceRegistry::new();
        registry.register(descriptor("a", &[], &[])).unwrap();
        registry.register(descriptor("b", &["a"], &[])).unwrap();
        registry.register(descriptor("c", &["a", "b"], &[])).unwrap();
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let mut registry = ServiceRegistry::new();
        registry.register(descriptor("a", &["ghost"], &[])).unwrap();
        let err = registry.validate().unwrap_err();
        assert!(matches!(err, ServiceGraphError::UnknownDependency { .. }));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let mut registry = ServiceRegistry::new();
        registry.register(descriptor("a", &["b"], &[])).unwrap();
        registry.register(descriptor("b", &["a"], &[])).unwrap();
        let err = registry.validate().unwrap_err();
        assert!(matches!(err, ServiceGraphError::DependencyCycle { .. }));
    }

    #[test]
    fn test_validate_rejects_optional_cycle() {
        let mut registry = ServiceRegistry::new();
        registry.register(descriptor("a", &[], &["b"])).unwrap();
        registry.register(descriptor("b", &["a"], &[])).unwrap();
        let err = registry.validate().unwrap_err();
        assert!(matches!(err, ServiceGraphError::DependencyCycle { .. }));
    }

    #[test]
    fn test_eligible_names_filters_by_role() {
        let mut registry = ServiceRegistry::new();
        registry.register(descriptor("everywhere", &[], &[])).unwrap();
        registry
            .register(ServiceDescriptor {
                name: "rack-only",
                requires: &[],
                optional: &[],
                eligible: |role| role.is_rack(),
                factory: noop_factory,
            })
            .unwrap();
        let names = registry.eligible_names(ProcessRole::RegionWorker);
        assert_eq!(names, vec!["everywhere"]);
        let names = registry.eligible_names(ProcessRole::RackAgent);
        assert_eq!(names, vec!["everywhere", "rack-only"]);
    }
}
