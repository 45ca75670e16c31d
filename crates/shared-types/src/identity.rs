//! # Event-Loop Identity
//!
//! A logical name identifying one control-plane process instance. Identities
//! are stable across address changes: the cluster connection directory is
//! keyed by identity, and a peer that moves to a new address keeps its name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical name of one event loop (one process instance).
///
/// The conventional form is `<hostname>:pid=<pid>`, but the type places no
/// constraint on the content beyond non-emptiness being sensible; equality
/// and hashing are on the full string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLoopId(String);

impl EventLoopId {
    /// Wrap an identity string.
    pub fn new(ident: impl Into<String>) -> Self {
        Self(ident.into())
    }

    /// The conventional identity for the current process.
    #[must_use]
    pub fn local() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self(format!("{}:pid={}", host, std::process::id()))
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventLoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventLoopId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventLoopId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
