//! # Cluster RPC - Rack-to-Region Connection Fabric
//!
//! Rack agents keep one secured, multiplexed RPC connection to every region
//! event loop currently advertised by the region's roster endpoint. This
//! crate implements the whole discipline:
//!
//! ```text
//! ┌──────────────┐  GET /rpc/          ┌───────────────────────┐
//! │  rack agent  │ ───────────────────▶│ region roster endpoint │
//! │              │  {"eventloops": …}  └───────────────────────┘
//! │ Discovery    │
//! │ loop (30-90s)│  reconcile: drop stale address → connect new
//! │              │             → drop unadvertised
//! │ Connection   │  TCP → STARTTLS → TLS → identify → register
//! │ directory    │  (at most one connection per event-loop identity)
//! └──────────────┘
//! ```
//!
//! Commands are a closed enumeration dispatched through a responder table
//! built at startup; both ends of a connection can issue calls (the protocol
//! is symmetric once established).
//!
//! ## Failure Isolation
//!
//! Fetch failures end the tick and are retried next tick. Connect and
//! handshake failures are logged per candidate address and never fatal.
//! Aggregate queries treat an unreachable peer as "unknown" and keep going.

pub mod calls;
pub mod commands;
pub mod connection;
pub mod directory;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod responder;
pub mod roster;
pub mod server;
pub mod tls;
pub mod wire;

pub use calls::{get_all_available_boot_images, is_import_boot_images_running};
pub use commands::{Architecture, BootImage, CommandKind, PowerType, Request, Response};
pub use connection::Client;
pub use directory::ConnectionDirectory;
pub use discovery::{ClusterClientService, DiscoveryConfig};
pub use error::RpcError;
pub use responder::{CommandResponder, IdentifyResponder, ResponderTable};
pub use roster::{PeerAddr, Roster};
pub use server::{RegionRpcServer, RegionServerConfig};
pub use tls::TlsContext;

/// Hard ceiling on a single RPC frame, header included.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Default bound on one candidate-address connect attempt (TCP connect plus
/// handshake). Without it a dead candidate would stall a whole
/// reconciliation tick.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Discovery tick interval band, seconds. Re-randomized every tick so a
/// fleet of rack agents does not reconnect in lockstep.
pub const MIN_TICK_INTERVAL_SECS: u64 = 30;
/// Upper bound of the tick interval band, inclusive.
pub const MAX_TICK_INTERVAL_SECS: u64 = 90;
