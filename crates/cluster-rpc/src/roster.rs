//! # Roster Document
//!
//! The region advertises its reachable event loops at a well-known HTTP
//! endpoint as `{"eventloops": {"<identity>": [[host, port], …], …}}`.
//! Rack agents fetch it once per discovery tick; the document is ephemeral
//! and never persisted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// An advertised `(host, port)` candidate.
pub type PeerAddr = (String, u16);

/// The advertised mapping of event-loop identity to candidate addresses.
///
/// Candidate order matters: connect attempts try addresses in the order
/// advertised, stopping at the first success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub eventloops: BTreeMap<String, Vec<PeerAddr>>,
}

impl Roster {
    /// An empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or extend) the candidates advertised for `ident`.
    pub fn advertise(&mut self, ident: impl Into<String>, address: PeerAddr) {
        self.eventloops.entry(ident.into()).or_default().push(address);
    }

    /// The advertised candidates for `ident`.
    #[must_use]
    pub fn endpoints_of(&self, ident: &str) -> &[PeerAddr] {
        self.eventloops.get(ident).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The roster URL derived from a region base URL.
#[must_use]
pub fn rpc_info_url(base_url: &str) -> String {
    format!("{}/rpc/", base_url.trim_end_matches('/'))
}

/// Fetch and parse the roster. Non-2xx statuses and malformed payloads are
/// both fetch failures; the caller logs and retries next tick.
pub async fn fetch_roster(http: &reqwest::Client, url: &str) -> Result<Roster, RpcError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| RpcError::RosterFetch(e.to_string()))?
        .error_for_status()
        .map_err(|e| RpcError::RosterFetch(e.to_string()))?;
    response
        .json::<Roster>()
        .await
        .map_err(|e| RpcError::RosterFetch(format!("malformed roster document: {e}")))
}
