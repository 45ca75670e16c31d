//! # RPC Error Types
//!
//! The taxonomy distinguishes recoverable per-candidate failures (connect,
//! handshake, identity mismatch) from the explicitly named
//! `NoConnectionsAvailable` condition callers receive when the directory is
//! empty — which is not the same thing as a call failing on an established
//! connection.

use shared_types::EventLoopId;
use thiserror::Error;

use crate::commands::CommandKind;

/// Errors raised by the cluster RPC layer.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport-level I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A frame exceeded the protocol ceiling.
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// TLS setup or negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The handshake sequence was violated.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// The remote event loop identified itself under an unexpected name.
    #[error("remote event-loop identifies itself as {actual}, but {expected} was expected")]
    IdentityMismatch {
        expected: EventLoopId,
        actual: EventLoopId,
    },

    /// A connection for this identity is already registered.
    #[error("a connection to event-loop {ident} is already registered")]
    DuplicateConnection { ident: EventLoopId },

    /// The connection died before or during the call.
    #[error("connection to event-loop {ident} is closed")]
    ConnectionClosed { ident: EventLoopId },

    /// One candidate-address attempt exceeded the connect timeout.
    #[error("connect attempt to {host}:{port} timed out")]
    ConnectTimeout { host: String, port: u16 },

    /// The connection directory is empty.
    #[error("no connections available to any region event-loop")]
    NoConnectionsAvailable,

    /// The roster document could not be fetched or parsed.
    #[error("roster fetch failed: {0}")]
    RosterFetch(String),

    /// No responder is registered for the command.
    #[error("no responder registered for command {kind}")]
    UnhandledCommand { kind: CommandKind },

    /// The peer answered a command with the wrong response variant.
    #[error("unexpected response to command {command}")]
    UnexpectedResponse { command: CommandKind },

    /// The peer's responder reported a failure.
    #[error("remote error: {message}")]
    Remote { message: String },
}
