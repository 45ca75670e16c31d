//! # Service Tree
//!
//! The runtime container of instantiated services. The tree exclusively owns
//! its instances, tags each with its descriptor name, and drives the
//! lifecycle: prepare hook, concurrent child start, concurrent best-effort
//! stop, and reset back to an empty tree.
//!
//! Mutation (attach/start/stop/reset) happens only from the orchestrating
//! task; read accessors are cheap and safe from any task.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use shared_types::{Service, ServiceError, ServiceState};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::ServiceGraphError;

/// Async hook run before any child service starts.
pub type PrepareHook =
    Box<dyn Fn() -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;

/// Runtime container of instantiated services.
///
/// Instances are kept in attach order, which the builder guarantees is a
/// valid dependency order; names are unique within a tree.
pub struct ServiceTree {
    instances: RwLock<Vec<(&'static str, Arc<dyn Service>)>>,
    status: RwLock<HashMap<&'static str, ServiceState>>,
    state: RwLock<ServiceState>,
    prepare: Option<PrepareHook>,
}

impl Default for ServiceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceTree {
    /// Create an empty tree with no prepare hook.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: RwLock::new(Vec::new()),
            status: RwLock::new(HashMap::new()),
            state: RwLock::new(ServiceState::Stopped),
            prepare: None,
        }
    }

    /// Create an empty tree that runs `prepare` before starting children.
    #[must_use]
    pub fn with_prepare(prepare: PrepareHook) -> Self {
        Self {
            prepare: Some(prepare),
            ..Self::new()
        }
    }

    /// Attach a built instance under its descriptor name.
    pub fn attach(
        &self,
        name: &'static str,
        service: Arc<dyn Service>,
    ) -> Result<(), ServiceGraphError> {
        let mut instances = self.instances.write();
        if instances.iter().any(|(n, _)| *n == name) {
            return Err(ServiceGraphError::AlreadyAttached {
                name: name.to_string(),
            });
        }
        instances.push((name, service));
        self.status.write().insert(name, ServiceState::Stopped);
        Ok(())
    }

    /// Look up an attached instance by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.instances
            .read()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| Arc::clone(s))
    }

    /// Attached service names, in attach (dependency) order.
    #[must_use]
    pub fn service_names(&self) -> Vec<&'static str> {
        self.instances.read().iter().map(|(n, _)| *n).collect()
    }

    /// Number of attached services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Whether the tree holds no services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// The tree-level lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// A child's lifecycle state, if attached.
    #[must_use]
    pub fn service_state(&self, name: &str) -> Option<ServiceState> {
        self.status.read().get(name).copied()
    }

    /// Whether the tree is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Start the tree: run the prepare hook, then start all children
    /// concurrently and wait for every one to report.
    ///
    /// If a child fails, its siblings are left running, the child is marked
    /// `Failed` and the first failure is returned to the caller.
    pub async fn start(&self) -> Result<(), ServiceGraphError> {
        self.transition("start", ServiceState::Stopped, ServiceState::Starting)?;

        if let Some(prepare) = &self.prepare {
            if let Err(err) = prepare().await {
                *self.state.write() = ServiceState::Stopped;
                return Err(err.into());
            }
        }

        let snapshot: Vec<_> = self.instances.read().clone();
        {
            let mut status = self.status.write();
            for (name, _) in &snapshot {
                status.insert(*name, ServiceState::Starting);
            }
        }

        let mut tasks = JoinSet::new();
        for (name, service) in snapshot {
            tasks.spawn(async move { (name, service.start().await) });
        }

        let mut first_failure: Option<ServiceGraphError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    self.status.write().insert(name, ServiceState::Running);
                    info!(service = name, "service started");
                }
                Ok((name, Err(err))) => {
                    self.status.write().insert(name, ServiceState::Failed);
                    warn!(service = name, error = %err, "service failed to start");
                    first_failure.get_or_insert(err.into());
                }
                Err(join_err) => {
                    warn!(error = %join_err, "service start task panicked");
                    first_failure.get_or_insert(ServiceGraphError::Service(
                        ServiceError::StartFailed {
                            service: "<unknown>".to_string(),
                            reason: join_err.to_string(),
                        },
                    ));
                }
            }
        }

        *self.state.write() = ServiceState::Running;
        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Stop all children concurrently, best effort: individual failures are
    /// logged and do not prevent the remaining children from stopping.
    pub async fn stop(&self) -> Result<(), ServiceGraphError> {
        self.transition("stop", ServiceState::Running, ServiceState::Stopping)?;

        let snapshot: Vec<_> = self.instances.read().clone();
        let mut tasks = JoinSet::new();
        for (name, service) in snapshot {
            tasks.spawn(async move { (name, service.stop().await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    self.status.write().insert(name, ServiceState::Stopped);
                    info!(service = name, "service stopped");
                }
                Ok((name, Err(err))) => {
                    self.status.write().insert(name, ServiceState::Stopped);
                    warn!(service = name, error = %err, "service failed to stop cleanly");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "service stop task panicked");
                }
            }
        }

        *self.state.write() = ServiceState::Stopped;
        Ok(())
    }

    /// Stop the tree if running, then detach every child so a subsequent
    /// populate starts clean.
    pub async fn reset(&self) -> Result<(), ServiceGraphError> {
        if self.state() == ServiceState::Running {
            self.stop().await?;
        }
        let state = self.state();
        if state != ServiceState::Stopped {
            return Err(ServiceGraphError::InvalidTreeState {
                operation: "reset",
                state,
            });
        }
        self.instances.write().clear();
        self.status.write().clear();
        Ok(())
    }

    /// Check-and-set of the tree state, atomic under the state write lock.
    fn transition(
        &self,
        operation: &'static str,
        expect: ServiceState,
        next: ServiceState,
    ) -> Result<(), ServiceGraphError> {
        let mut state = self.state.write();
        if *state != expect {
            return Err(ServiceGraphError::InvalidTreeState {
                operation,
                state: *state,
            });
        }
        *state = next;
        Ok(())
    }
}
