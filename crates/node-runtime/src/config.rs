//! # Node Configuration
//!
//! Unified configuration for all services and runtime parameters. Every
//! section has sane defaults; a TOML file and `FOUNDRY_*` environment
//! variables override them, in that order.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use cluster_rpc::DiscoveryConfig;
use serde::Deserialize;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Region RPC listener configuration.
    pub rpc: RpcConfig,
    /// Roster web endpoint configuration.
    pub web: WebConfig,
    /// Rack-side discovery loop configuration.
    pub discovery: DiscoverySettings,
    /// Status worker configuration.
    pub status: StatusSettings,
    /// Boot-image import configuration.
    pub import: ImportSettings,
    /// Region worker pool configuration.
    pub workers: WorkerSettings,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("cannot parse configuration file: {0}")]
    Parse(String),

    /// A bind address does not parse.
    #[error("invalid address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    /// The discovery interval band is inverted.
    #[error("discovery interval band is inverted: min {min}s > max {max}s")]
    InvalidIntervalBand { min: u64, max: u64 },
}

impl NodeConfig {
    /// Load configuration: defaults, then the TOML file if given, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            None => Self::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `FOUNDRY_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FOUNDRY_REGION_URL") {
            self.discovery.region_url = url;
        }
        if let Ok(addr) = std::env::var("FOUNDRY_RPC_BIND") {
            self.rpc.bind_addr = addr;
        }
        if let Ok(addr) = std::env::var("FOUNDRY_WEB_BIND") {
            self.web.bind_addr = addr;
        }
        if let Ok(secs) = std::env::var("FOUNDRY_CONNECT_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.discovery.connect_timeout_secs = secs;
            }
        }
    }

    /// Validate everything that later factories rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc_bind_addr()?;
        self.web_bind_addr()?;
        if self.discovery.min_interval_secs > self.discovery.max_interval_secs {
            return Err(ConfigError::InvalidIntervalBand {
                min: self.discovery.min_interval_secs,
                max: self.discovery.max_interval_secs,
            });
        }
        Ok(())
    }

    /// The parsed RPC bind address.
    pub fn rpc_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.rpc
            .bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                field: "rpc.bind_addr",
                value: self.rpc.bind_addr.clone(),
            })
    }

    /// The parsed web bind address.
    pub fn web_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.web
            .bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                field: "web.bind_addr",
                value: self.web.bind_addr.clone(),
            })
    }

    /// The discovery loop configuration for the cluster client.
    #[must_use]
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            region_url: self.discovery.region_url.clone(),
            min_interval_secs: self.discovery.min_interval_secs,
            max_interval_secs: self.discovery.max_interval_secs,
            connect_timeout: Duration::from_secs(self.discovery.connect_timeout_secs),
        }
    }
}

/// Region RPC listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Listen address for inbound rack connections.
    pub bind_addr: String,
    /// Host advertised to racks in the roster; the bind address may be
    /// a wildcard, the advertised host must be reachable.
    pub advertise_host: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5250".to_string(),
            advertise_host: "127.0.0.1".to_string(),
        }
    }
}

/// Roster web endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen address for the roster/status HTTP endpoint.
    pub bind_addr: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5240".to_string(),
        }
    }
}

/// Rack-side discovery loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Region base URL; the roster lives at `<region_url>/rpc/`.
    pub region_url: String,
    /// Lower bound of the tick interval band, seconds.
    pub min_interval_secs: u64,
    /// Upper bound of the tick interval band, seconds (inclusive).
    pub max_interval_secs: u64,
    /// Bound on one candidate-address connect attempt, seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            region_url: "http://localhost:5240".to_string(),
            min_interval_secs: cluster_rpc::MIN_TICK_INTERVAL_SECS,
            max_interval_secs: cluster_rpc::MAX_TICK_INTERVAL_SECS,
            connect_timeout_secs: cluster_rpc::DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Status worker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// Seconds between status flushes.
    pub interval_secs: u64,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Boot-image import configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Seconds between import passes.
    pub interval_secs: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

/// Region worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Number of region worker slots the master supervises.
    pub count: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { count: 4 }
    }
}
