//! # foundry-probe
//!
//! Operator probe for a running Foundry deployment: fetch a region's roster,
//! or open one secured connection to an RPC endpoint and issue a single
//! command, printing the result as JSON.
//!
//! ```text
//! foundry-probe roster --region-url http://region:5240
//! foundry-probe call --host 10.0.0.1 --port 5250 identify
//! foundry-probe call --host 10.0.0.1 --port 5250 list-boot-images
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpStream;

use cluster_rpc::handshake::{identify_exchange, initiate_secure};
use cluster_rpc::wire::{read_frame, write_frame, Envelope, Payload};
use cluster_rpc::{
    CommandKind, IdentifyResponder, Request, Response, ResponderTable, Roster, TlsContext,
};
use shared_types::EventLoopId;

#[derive(Parser)]
#[command(name = "foundry-probe", about = "Roster inspection and one-shot RPC calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and print the region's advertised roster.
    Roster {
        /// Region base URL; the roster lives at <url>/rpc/.
        #[arg(long, default_value = "http://localhost:5240")]
        region_url: String,
    },
    /// Open one secured connection and issue a single command.
    Call {
        /// RPC endpoint host.
        #[arg(long)]
        host: String,
        /// RPC endpoint port.
        #[arg(long, default_value_t = 5250)]
        port: u16,
        /// The command to issue.
        #[arg(value_enum)]
        command: ProbeCommand,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProbeCommand {
    Identify,
    ListBootImages,
    DescribePowerTypes,
    ListSupportedArchitectures,
    IsImportRunning,
}

impl ProbeCommand {
    fn request(self) -> Request {
        match self {
            Self::Identify => Request::Identify,
            Self::ListBootImages => Request::ListBootImages,
            Self::DescribePowerTypes => Request::DescribePowerTypes,
            Self::ListSupportedArchitectures => Request::ListSupportedArchitectures,
            Self::IsImportRunning => Request::IsImportBootImagesRunning,
        }
    }
}

async fn fetch_roster(region_url: &str) -> Result<Roster> {
    let http = reqwest::Client::new();
    let url = cluster_rpc::roster::rpc_info_url(region_url);
    cluster_rpc::roster::fetch_roster(&http, &url)
        .await
        .with_context(|| format!("cannot fetch roster from {url}"))
}

/// One-shot call: handshake, issue the command, print the response.
async fn call_once(host: &str, port: u16, request: Request) -> Result<Response> {
    let probe_ident = EventLoopId::new(format!("probe:pid={}", std::process::id()));
    let responders = ResponderTable::new().with(
        CommandKind::Identify,
        Arc::new(IdentifyResponder::new(probe_ident)),
    );

    let tls = TlsContext::self_signed()?;
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("cannot connect to {host}:{port}"))?;
    let mut secured = initiate_secure(stream, &tls).await?;
    let peer = identify_exchange(&mut secured, &responders).await?;
    eprintln!("connected to event-loop {peer}");

    write_frame(&mut secured, &Envelope::new(1, Payload::Request(request))).await?;
    loop {
        let envelope = read_frame(&mut secured).await?;
        match envelope.payload {
            Payload::Response(response) if envelope.id == 1 => return Ok(response),
            Payload::Failure { message } if envelope.id == 1 => {
                bail!("remote error: {message}");
            }
            // The peer may issue its own calls; answer and keep waiting.
            Payload::Request(request) => {
                let reply = match responders.dispatch(request).await {
                    Ok(response) => Payload::Response(response),
                    Err(err) => Payload::Failure {
                        message: err.to_string(),
                    },
                };
                write_frame(&mut secured, &Envelope::new(envelope.id, reply)).await?;
            }
            other => bail!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Roster { region_url } => {
            let roster = fetch_roster(&region_url).await?;
            println!("{}", serde_json::to_string_pretty(&roster)?);
        }
        Command::Call {
            host,
            port,
            command,
        } => {
            let response = call_once(&host, port, command.request()).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}
