//! # Peer Discovery Loop
//!
//! The rack-side cluster client service. Once per tick it fetches the
//! region's roster and reconciles the connection directory against it:
//!
//! 1. Drop connections whose address the peer no longer advertises (the peer
//!    reconfigured; a replacement is attempted in the same tick).
//! 2. Connect to advertised event loops with no current connection, trying
//!    candidate addresses in order and stopping at the first success.
//! 3. Drop connections to event loops that are no longer advertised at all.
//!
//! The tick interval is re-randomized every tick, uniform in the configured
//! band, so a fleet of rack agents does not hammer the region in lockstep.
//! Ticks never overlap: the next sleep starts only after the previous
//! reconciliation, including all its connect attempts, has finished.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_types::{EventLoopId, Service, ServiceError, ServiceState};

use crate::connection::{spawn_connection, Client};
use crate::directory::ConnectionDirectory;
use crate::error::RpcError;
use crate::handshake::{identify_exchange, initiate_secure};
use crate::responder::ResponderTable;
use crate::roster::{fetch_roster, rpc_info_url, Roster};
use crate::tls::TlsContext;
use crate::{DEFAULT_CONNECT_TIMEOUT_SECS, MAX_TICK_INTERVAL_SECS, MIN_TICK_INTERVAL_SECS};

/// Configuration of the discovery loop.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Region base URL; the roster lives at `<region_url>/rpc/`.
    pub region_url: String,
    /// Lower bound of the tick interval band, seconds.
    pub min_interval_secs: u64,
    /// Upper bound of the tick interval band, seconds (inclusive).
    pub max_interval_secs: u64,
    /// Bound on one candidate-address attempt: TCP connect plus handshake.
    pub connect_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            region_url: "http://localhost:5240".to_string(),
            min_interval_secs: MIN_TICK_INTERVAL_SECS,
            max_interval_secs: MAX_TICK_INTERVAL_SECS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

struct DiscoveryState {
    config: DiscoveryConfig,
    directory: Arc<ConnectionDirectory>,
    responders: Arc<ResponderTable>,
    tls: TlsContext,
    http: reqwest::Client,
}

/// The rack agent's region connection maintainer.
///
/// Owns the connection directory; other parts of the process obtain
/// connections through [`ClusterClientService::get_client`] or the directory
/// handle, which are read-only with respect to the reconciliation loop.
pub struct ClusterClientService {
    state: Arc<DiscoveryState>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterClientService {
    /// Build the service. `responders` answers commands the region invokes
    /// on this rack over the maintained connections.
    pub fn new(config: DiscoveryConfig, responders: ResponderTable) -> Result<Self, RpcError> {
        let tls = TlsContext::self_signed()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RpcError::RosterFetch(e.to_string()))?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            state: Arc::new(DiscoveryState {
                config,
                directory: Arc::new(ConnectionDirectory::new()),
                responders: Arc::new(responders),
                tls,
                http,
            }),
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// The directory of current region connections.
    #[must_use]
    pub fn directory(&self) -> Arc<ConnectionDirectory> {
        Arc::clone(&self.state.directory)
    }

    /// A connection to a region event loop, chosen uniformly at random.
    pub fn get_client(&self) -> Result<Client, RpcError> {
        self.state.directory.get_client()
    }

    /// Run one reconciliation against a given roster. Exposed for tests;
    /// the running loop calls this with freshly fetched rosters.
    pub async fn update_connections(&self, roster: Roster) {
        self.state.update_connections(roster).await;
    }
}

#[async_trait]
impl Service for ClusterClientService {
    async fn start(&self) -> Result<(), ServiceError> {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return Err(ServiceError::InvalidState {
                service: "rpc-client".to_string(),
                operation: "start",
                state: ServiceState::Running,
            });
        }
        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.subscribe();
        *slot = Some(tokio::spawn(run_loop(state, shutdown)));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        let handle = self.task.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        self.shutdown.send_replace(true);
        let _ = handle.await;
        for ident in self.state.directory.idents() {
            if let Some(client) = self.state.directory.remove(&ident) {
                client.close().await;
            }
        }
        self.shutdown.send_replace(false);
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

async fn run_loop(state: Arc<DiscoveryState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = state.update() => {}
            _ = shutdown.changed() => break,
        }
        let interval = Duration::from_secs(state.random_interval());
        debug!(secs = interval.as_secs(), "next discovery tick scheduled");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("discovery loop stopped");
}

impl DiscoveryState {
    /// Uniform random interval in the configured band, re-drawn every tick.
    fn random_interval(&self) -> u64 {
        let min = self.config.min_interval_secs;
        let max = self.config.max_interval_secs.max(min);
        rand::thread_rng().gen_range(min..=max)
    }

    async fn update(&self) {
        let url = rpc_info_url(&self.config.region_url);
        match fetch_roster(&self.http, &url).await {
            Ok(roster) => self.update_connections(roster).await,
            Err(err) => {
                warn!(url = %url, error = %err, "roster fetch failed; will retry next tick");
            }
        }
    }

    async fn update_connections(&self, roster: Roster) {
        // Drop connections whose address is no longer among the peer's
        // advertised candidates. The peer is still advertised; the
        // replacement connect happens later in this same tick, and an
        // identity never holds two connections at once.
        for (name, addresses) in &roster.eventloops {
            let ident = EventLoopId::from(name.as_str());
            if let Some(current) = self.directory.address_of(&ident) {
                if !addresses.contains(&current) {
                    info!(
                        eventloop = %ident,
                        host = %current.0,
                        port = current.1,
                        "connected address no longer advertised; dropping"
                    );
                    if let Some(client) = self.directory.remove(&ident) {
                        client.close().await;
                    }
                }
            }
        }

        // Connect to advertised event loops we have no connection to, trying
        // each candidate in order until one succeeds.
        for (name, addresses) in &roster.eventloops {
            let ident = EventLoopId::from(name.as_str());
            if self.directory.client_for(&ident).is_some() {
                continue;
            }
            for (host, port) in addresses {
                match self.connect_peer(&ident, host, *port).await {
                    Ok(client) => {
                        match self.directory.register(client.clone()) {
                            Ok(()) => {
                                info!(eventloop = %ident, host = %host, port = *port, "connected");
                            }
                            Err(err) => {
                                debug!(eventloop = %ident, reason = %err, "registration race lost");
                                client.close().await;
                            }
                        }
                        break;
                    }
                    Err(err) => {
                        info!(
                            eventloop = %ident,
                            host = %host,
                            port = *port,
                            error = %err,
                            "connect attempt failed"
                        );
                    }
                }
            }
        }

        // Drop connections to event loops that are no longer advertised.
        for ident in self.directory.idents() {
            if !roster.eventloops.contains_key(ident.as_str()) {
                info!(eventloop = %ident, "event-loop no longer advertised; dropping connection");
                if let Some(client) = self.directory.remove(&ident) {
                    client.close().await;
                }
            }
        }
    }

    /// One candidate-address attempt: TCP connect, channel security,
    /// identity verification. Bounded by `connect_timeout` as a whole.
    async fn connect_peer(
        &self,
        ident: &EventLoopId,
        host: &str,
        port: u16,
    ) -> Result<Client, RpcError> {
        let attempt = async {
            let stream = TcpStream::connect((host, port)).await?;
            let mut secured = initiate_secure(stream, &self.tls).await?;
            let actual = identify_exchange(&mut secured, &self.responders).await?;
            if actual != *ident {
                // Never admitted: dropping the stream closes the transport.
                return Err(RpcError::IdentityMismatch {
                    expected: ident.clone(),
                    actual,
                });
            }
            let registration = Uuid::new_v4();
            let directory = Arc::clone(&self.directory);
            let cleanup_ident = ident.clone();
            Ok(spawn_connection(
                secured,
                ident.clone(),
                (host.to_string(), port),
                registration,
                Arc::clone(&self.responders),
                move || {
                    directory.remove_registration(&cleanup_ident, registration);
                },
            ))
        };
        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::ConnectTimeout {
                host: host.to_string(),
                port,
            }),
        }
    }
}
