//! # Connection Directory
//!
//! The live mapping from event-loop identity to its one established,
//! authenticated connection. Identity is the authoritative key: addresses
//! change across roster ticks, identities do not.
//!
//! Registration is a check-then-insert under the write lock, so whichever
//! connection registers first wins and a racing duplicate is rejected.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use shared_types::EventLoopId;
use uuid::Uuid;

use crate::connection::Client;
use crate::error::RpcError;
use crate::roster::PeerAddr;

/// Identity-keyed registry of established connections.
#[derive(Default)]
pub struct ConnectionDirectory {
    connections: RwLock<HashMap<EventLoopId, Client>>,
}

impl ConnectionDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection under its identity.
    ///
    /// Fails with `DuplicateConnection` if an entry for the identity already
    /// exists; the caller must close the rejected connection.
    pub fn register(&self, client: Client) -> Result<(), RpcError> {
        let mut connections = self.connections.write();
        if connections.contains_key(client.ident()) {
            return Err(RpcError::DuplicateConnection {
                ident: client.ident().clone(),
            });
        }
        connections.insert(client.ident().clone(), client);
        Ok(())
    }

    /// Remove and return the connection for `ident`, if any.
    pub fn remove(&self, ident: &EventLoopId) -> Option<Client> {
        self.connections.write().remove(ident)
    }

    /// Remove the entry for `ident` only if it is the exact connection with
    /// this registration id. Used by transport-loss cleanup so a dead
    /// connection never evicts its own replacement.
    pub(crate) fn remove_registration(
        &self,
        ident: &EventLoopId,
        registration: Uuid,
    ) -> Option<Client> {
        let mut connections = self.connections.write();
        if connections
            .get(ident)
            .map(|c| c.registration() == registration)
            .unwrap_or(false)
        {
            connections.remove(ident)
        } else {
            None
        }
    }

    /// One connection chosen uniformly at random, for load distribution.
    pub fn get_client(&self) -> Result<Client, RpcError> {
        let connections = self.connections.read();
        let clients: Vec<&Client> = connections.values().collect();
        clients
            .choose(&mut rand::thread_rng())
            .map(|c| (*c).clone())
            .ok_or(RpcError::NoConnectionsAvailable)
    }

    /// The connection for a specific identity, if any.
    #[must_use]
    pub fn client_for(&self, ident: &EventLoopId) -> Option<Client> {
        self.connections.read().get(ident).cloned()
    }

    /// Every current connection.
    #[must_use]
    pub fn all_clients(&self) -> Vec<Client> {
        self.connections.read().values().cloned().collect()
    }

    /// Every connected identity.
    #[must_use]
    pub fn idents(&self) -> Vec<EventLoopId> {
        self.connections.read().keys().cloned().collect()
    }

    /// The address the connection for `ident` was made to, if connected.
    #[must_use]
    pub fn address_of(&self, ident: &EventLoopId) -> Option<PeerAddr> {
        self.connections.read().get(ident).map(|c| c.address().clone())
    }

    /// Number of connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
