//! # Roster Web Service
//!
//! The region's discovery endpoint: `GET /rpc/` serves the advertised
//! roster as `{"eventloops": …}`, which rack agents poll to reconcile their
//! connections. `GET /status` reports light process health; the status
//! worker is an optional dependency and its section is null when absent.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use cluster_rpc::Roster;
use shared_types::{Service, ServiceError, ServiceState};

use crate::services::advertiser::EndpointAdvertiserService;
use crate::services::status_worker::StatusWorkerService;

#[derive(Clone)]
struct WebState {
    advertiser: Arc<EndpointAdvertiserService>,
    status: Option<Arc<StatusWorkerService>>,
}

/// HTTP endpoint serving the roster and node status.
pub struct RosterWebService {
    bind_addr: SocketAddr,
    state: WebState,
    local_addr: RwLock<Option<SocketAddr>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RosterWebService {
    /// Create a stopped web service.
    #[must_use]
    pub fn new(
        bind_addr: SocketAddr,
        advertiser: Arc<EndpointAdvertiserService>,
        status: Option<Arc<StatusWorkerService>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bind_addr,
            state: WebState { advertiser, status },
            local_addr: RwLock::new(None),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// The bound address, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }
}

async fn roster_handler(State(state): State<WebState>) -> Json<Roster> {
    Json(state.advertiser.roster())
}

async fn status_handler(State(state): State<WebState>) -> Json<serde_json::Value> {
    let status_worker = state
        .status
        .as_ref()
        .map(|s| serde_json::json!({ "flushes": s.flushes() }));
    Json(serde_json::json!({
        "eventloop": state.advertiser.ident().as_str(),
        "status-worker": status_worker,
    }))
}

#[async_trait]
impl Service for RosterWebService {
    async fn start(&self) -> Result<(), ServiceError> {
        if self.task.lock().is_some() {
            return Err(ServiceError::InvalidState {
                service: "web".to_string(),
                operation: "start",
                state: ServiceState::Running,
            });
        }
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| ServiceError::start("web", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServiceError::start("web", e))?;
        *self.local_addr.write() = Some(local_addr);
        info!(addr = %local_addr, "roster endpoint bound");

        let app = Router::new()
            .route("/rpc/", get(roster_handler))
            .route("/status", get(status_handler))
            .with_state(self.state.clone());

        let mut shutdown = self.shutdown.subscribe();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        });
        *self.task.lock() = Some(tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "roster endpoint failed");
            }
        }));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        self.shutdown.send_replace(true);
        let _ = handle.await;
        *self.local_addr.write() = None;
        self.shutdown.send_replace(false);
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::EventLoopId;

    #[tokio::test]
    async fn test_serves_roster_document() {
        let ident = EventLoopId::from("region-a:pid=1");
        let advertiser = Arc::new(EndpointAdvertiserService::new(ident.clone()));
        advertiser.advertise(&ident, ("10.0.0.1".to_string(), 5250));

        let web = RosterWebService::new(
            "127.0.0.1:0".parse().expect("valid test bind addr"),
            Arc::clone(&advertiser),
            None,
        );
        web.start().await.unwrap();
        let addr = web.local_addr().unwrap();

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/rpc/"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            body["eventloops"]["region-a:pid=1"][0],
            serde_json::json!(["10.0.0.1", 5250])
        );

        let status: serde_json::Value = reqwest::get(format!("http://{addr}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status-worker"], serde_json::Value::Null);

        web.stop().await.unwrap();
        assert!(web.local_addr().is_none());
    }
}
