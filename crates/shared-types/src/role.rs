//! # Process Roles
//!
//! A process is started in exactly one role. The role decides which services
//! from the descriptor table are eligible to run in that process; it never
//! changes for the lifetime of the process.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of roles a control-plane process can run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessRole {
    /// Region master: supervises region workers and master-only housekeeping.
    RegionMaster,
    /// Region worker: serves RPC and the roster endpoint.
    RegionWorker,
    /// Single process carrying both region sides plus the rack agent.
    AllInOne,
    /// Rack agent: connects outward to region controllers.
    RackAgent,
}

impl ProcessRole {
    /// All roles, in descriptor-table order.
    pub const ALL: [ProcessRole; 4] = [
        ProcessRole::RegionMaster,
        ProcessRole::RegionWorker,
        ProcessRole::AllInOne,
        ProcessRole::RackAgent,
    ];

    /// Stable name used in configuration and CLI arguments.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegionMaster => "region-master",
            Self::RegionWorker => "region-worker",
            Self::AllInOne => "all-in-one",
            Self::RackAgent => "rack-agent",
        }
    }

    /// Whether this role carries region-side duties.
    #[must_use]
    pub fn is_region(&self) -> bool {
        matches!(
            self,
            Self::RegionMaster | Self::RegionWorker | Self::AllInOne
        )
    }

    /// Whether this role carries rack-side duties.
    #[must_use]
    pub fn is_rack(&self) -> bool {
        matches!(self, Self::RackAgent | Self::AllInOne)
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown process role '{}' (expected one of: region-master, \
             region-worker, all-in-one, rack-agent)",
            self.0
        )
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for ProcessRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "region-master" => Ok(Self::RegionMaster),
            "region-worker" => Ok(Self::RegionWorker),
            "all-in-one" => Ok(Self::AllInOne),
            "rack-agent" => Ok(Self::RackAgent),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}
