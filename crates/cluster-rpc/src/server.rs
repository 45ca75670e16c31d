//! # Region RPC Listener
//!
//! The region side of the cluster fabric: accepts inbound rack connections,
//! runs the acceptor half of the secure handshake, learns the rack's
//! identity with the identify exchange and registers the connection in the
//! region's own directory — at most one per rack identity, first
//! registration wins.
//!
//! Once registered, the connection is symmetric: region code calls rack
//! commands (image inventory, import status) through the directory.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use shared_types::{EventLoopId, Service, ServiceError, ServiceState};

use crate::commands::CommandKind;
use crate::connection::spawn_connection;
use crate::directory::ConnectionDirectory;
use crate::error::RpcError;
use crate::handshake::{accept_secure, identify_exchange};
use crate::responder::{IdentifyResponder, ResponderTable};
use crate::tls::TlsContext;

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct RegionServerConfig {
    /// Address to listen on; port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,
}

impl Default for RegionServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5250".parse().expect("valid default bind addr"),
        }
    }
}

struct RegionServerState {
    ident: EventLoopId,
    config: RegionServerConfig,
    responders: Arc<ResponderTable>,
    directory: Arc<ConnectionDirectory>,
    tls: TlsContext,
    local_addr: RwLock<Option<SocketAddr>>,
    /// Set while the service is not accepting registrations; a handshake
    /// that completes after shutdown must not enter the directory.
    closed: AtomicBool,
}

/// The region controller's RPC listener service.
pub struct RegionRpcServer {
    state: Arc<RegionServerState>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RegionRpcServer {
    /// Build the listener. An `Identify` responder for `ident` is installed
    /// automatically so connecting racks can always verify who they reached.
    pub fn new(
        ident: EventLoopId,
        config: RegionServerConfig,
        responders: ResponderTable,
    ) -> Result<Self, RpcError> {
        let responders = responders.with(
            CommandKind::Identify,
            Arc::new(IdentifyResponder::new(ident.clone())),
        );
        let tls = TlsContext::self_signed()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            state: Arc::new(RegionServerState {
                ident,
                config,
                responders: Arc::new(responders),
                directory: Arc::new(ConnectionDirectory::new()),
                tls,
                local_addr: RwLock::new(None),
                closed: AtomicBool::new(true),
            }),
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// This region event loop's identity.
    #[must_use]
    pub fn ident(&self) -> &EventLoopId {
        &self.state.ident
    }

    /// The directory of registered rack connections.
    #[must_use]
    pub fn directory(&self) -> Arc<ConnectionDirectory> {
        Arc::clone(&self.state.directory)
    }

    /// The bound address, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.state.local_addr.read()
    }
}

#[async_trait]
impl Service for RegionRpcServer {
    async fn start(&self) -> Result<(), ServiceError> {
        if self.task.lock().is_some() {
            return Err(ServiceError::InvalidState {
                service: "rpc".to_string(),
                operation: "start",
                state: ServiceState::Running,
            });
        }
        let listener = TcpListener::bind(self.state.config.bind_addr)
            .await
            .map_err(|e| ServiceError::start("rpc", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServiceError::start("rpc", e))?;
        *self.state.local_addr.write() = Some(local_addr);
        info!(ident = %self.state.ident, addr = %local_addr, "region RPC listener bound");

        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.subscribe();
        let mut slot = self.task.lock();
        if slot.is_some() {
            return Err(ServiceError::InvalidState {
                service: "rpc".to_string(),
                operation: "start",
                state: ServiceState::Running,
            });
        }
        *slot = Some(tokio::spawn(accept_loop(state, listener, shutdown)));
        self.state.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        self.state.closed.store(true, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        let _ = handle.await;
        for ident in self.state.directory.idents() {
            if let Some(client) = self.state.directory.remove(&ident) {
                client.close().await;
            }
        }
        *self.state.local_addr.write() = None;
        self.shutdown.send_replace(false);
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

async fn accept_loop(
    state: Arc<RegionServerState>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(handle_inbound(state, stream, peer));
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn handle_inbound(state: Arc<RegionServerState>, stream: TcpStream, peer: SocketAddr) {
    let mut secured = match accept_secure(stream, &state.tls).await {
        Ok(secured) => secured,
        Err(err) => {
            info!(peer = %peer, error = %err, "inbound handshake failed");
            return;
        }
    };
    let ident = match identify_exchange(&mut secured, &state.responders).await {
        Ok(ident) => ident,
        Err(err) => {
            info!(peer = %peer, error = %err, "inbound peer failed to identify");
            return;
        }
    };

    let registration = Uuid::new_v4();
    let directory = Arc::clone(&state.directory);
    let cleanup_ident = ident.clone();
    let client = spawn_connection(
        secured,
        ident.clone(),
        (peer.ip().to_string(), peer.port()),
        registration,
        Arc::clone(&state.responders),
        move || {
            directory.remove_registration(&cleanup_ident, registration);
        },
    );

    if state.closed.load(Ordering::SeqCst) {
        info!(eventloop = %ident, peer = %peer, "listener stopped; refusing connection");
        client.close().await;
        return;
    }
    match state.directory.register(client.clone()) {
        Ok(()) => {
            info!(eventloop = %ident, peer = %peer, "rack connection registered");
        }
        Err(err) => {
            // Whoever registered first keeps the identity.
            info!(eventloop = %ident, reason = %err, "rejecting duplicate inbound connection");
            client.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Request, Response};
    use crate::handshake::initiate_secure;
    use crate::roster::PeerAddr;
    use std::time::Duration;

    fn rack_table(ident: &str) -> ResponderTable {
        ResponderTable::new().with(
            CommandKind::Identify,
            Arc::new(IdentifyResponder::new(EventLoopId::from(ident))),
        )
    }

    async fn connect_rack(
        port: u16,
        rack_ident: &str,
    ) -> (crate::connection::Client, EventLoopId) {
        let tls = TlsContext::self_signed().unwrap();
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut secured = initiate_secure(stream, &tls).await.unwrap();
        let responders = Arc::new(rack_table(rack_ident));
        let region_ident = identify_exchange(&mut secured, &responders).await.unwrap();
        let address: PeerAddr = ("127.0.0.1".to_string(), port);
        let client = spawn_connection(
            secured,
            region_ident.clone(),
            address,
            Uuid::new_v4(),
            responders,
            || {},
        );
        (client, region_ident)
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn test_inbound_rack_is_registered_and_callable() {
        let server = RegionRpcServer::new(
            EventLoopId::from("region-a:pid=1"),
            RegionServerConfig {
                bind_addr: "127.0.0.1:0".parse().expect("valid test bind addr"),
            },
            ResponderTable::new(),
        )
        .unwrap();
        server.start().await.unwrap();
        let port = server.local_addr().unwrap().port();

        let (rack_client, region_ident) = connect_rack(port, "rack-1:pid=5").await;
        assert_eq!(region_ident.as_str(), "region-a:pid=1");

        // The region side registers the rack under its identity.
        let directory = server.directory();
        wait_for("rack registration", || directory.len() == 1).await;
        let region_side = directory
            .client_for(&EventLoopId::from("rack-1:pid=5"))
            .unwrap();

        // Region → rack call over the inbound connection.
        match region_side.call(Request::Identify).await.unwrap() {
            Response::Identify { ident } => assert_eq!(ident.as_str(), "rack-1:pid=5"),
            other => panic!("unexpected response: {other:?}"),
        }

        // Rack → region call over the same connection.
        match rack_client.call(Request::Identify).await.unwrap() {
            Response::Identify { ident } => assert_eq!(ident.as_str(), "region-a:pid=1"),
            other => panic!("unexpected response: {other:?}"),
        }

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_rack_identity_rejected() {
        let server = RegionRpcServer::new(
            EventLoopId::from("region-a:pid=1"),
            RegionServerConfig {
                bind_addr: "127.0.0.1:0".parse().expect("valid test bind addr"),
            },
            ResponderTable::new(),
        )
        .unwrap();
        server.start().await.unwrap();
        let port = server.local_addr().unwrap().port();

        let (_first, _) = connect_rack(port, "rack-1:pid=5").await;
        let directory = server.directory();
        wait_for("first registration", || directory.len() == 1).await;

        // A second connection under the same identity: the existing one wins.
        let (_second, _) = connect_rack(port, "rack-1:pid=5").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(directory.len(), 1);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_loss_removes_registration() {
        let server = RegionRpcServer::new(
            EventLoopId::from("region-a:pid=1"),
            RegionServerConfig {
                bind_addr: "127.0.0.1:0".parse().expect("valid test bind addr"),
            },
            ResponderTable::new(),
        )
        .unwrap();
        server.start().await.unwrap();
        let port = server.local_addr().unwrap().port();

        let (rack_client, _) = connect_rack(port, "rack-1:pid=5").await;
        let directory = server.directory();
        wait_for("registration", || directory.len() == 1).await;

        rack_client.close().await;
        wait_for("loss cleanup", || directory.is_empty()).await;

        server.stop().await.unwrap();
    }
}
