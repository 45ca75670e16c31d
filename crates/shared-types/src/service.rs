//! # Service Lifecycle Contract
//!
//! Defines the contract that every orchestrable service implements to
//! participate in the dependency-ordered service tree.
//!
//! A service is a long-lived unit with an async start/stop lifecycle. The
//! tree owns the instances, tags them with their descriptor names and tracks
//! their states; services themselves only know how to start and stop.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a service (and of the tree as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    /// Not running.
    Stopped,
    /// Start in progress.
    Starting,
    /// Running normally.
    Running,
    /// Stop in progress.
    Stopping,
    /// Start failed; the service is not running.
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Error type for service lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service could not be started.
    #[error("service '{service}' failed to start: {reason}")]
    StartFailed { service: String, reason: String },

    /// The service could not be stopped cleanly.
    #[error("service '{service}' failed to stop: {reason}")]
    StopFailed { service: String, reason: String },

    /// A lifecycle operation was attempted in the wrong state.
    #[error("service '{service}' cannot {operation} while {state}")]
    InvalidState {
        service: String,
        operation: &'static str,
        state: ServiceState,
    },
}

impl ServiceError {
    /// Start failure with a formatted reason.
    pub fn start(service: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::StartFailed {
            service: service.into(),
            reason: reason.to_string(),
        }
    }

    /// Stop failure with a formatted reason.
    pub fn stop(service: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::StopFailed {
            service: service.into(),
            reason: reason.to_string(),
        }
    }
}

/// Contract implemented by every orchestrable service.
///
/// Instances are held behind `Arc<dyn Service>` by the service tree; `start`
/// and `stop` take `&self` so a service manages its own interior state
/// (task handles, shutdown channels).
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Start the service. Must be idempotent-safe to call once per tree start.
    async fn start(&self) -> Result<(), ServiceError>;

    /// Stop the service and release its resources.
    async fn stop(&self) -> Result<(), ServiceError>;

    /// Upcast for typed dependency recovery in service factories.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
