//! # foundry-node
//!
//! Entry point for every control-plane process. The role comes first on the
//! command line (or from `FOUNDRY_ROLE`); an optional second argument names
//! a TOML configuration file.
//!
//! ```text
//! foundry-node <region-master|region-worker|all-in-one|rack-agent> [config.toml]
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use shared_types::ProcessRole;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::bootstrap;
use node_runtime::config::NodeConfig;

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("cannot install tracing subscriber")
}

fn parse_role(args: &[String]) -> Result<ProcessRole> {
    let role = match args.first() {
        Some(arg) => arg.clone(),
        None => std::env::var("FOUNDRY_ROLE").unwrap_or_default(),
    };
    if role.is_empty() {
        bail!(
            "usage: foundry-node <region-master|region-worker|all-in-one|rack-agent> [config.toml]"
        );
    }
    role.parse::<ProcessRole>().map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let role = parse_role(&args)?;
    let config_path = args.get(1).map(PathBuf::from);
    let config = NodeConfig::load(config_path.as_deref())
        .with_context(|| format!("cannot load configuration ({config_path:?})"))?;

    match role {
        ProcessRole::RegionMaster => bootstrap::run_region_master(config).await,
        ProcessRole::RegionWorker => bootstrap::run_region_worker(config).await,
        ProcessRole::AllInOne => bootstrap::run_all_in_one(config).await,
        ProcessRole::RackAgent => bootstrap::run_rack_agent(config).await,
    }
}
