mod action;
mod core;
mod ingest;
mod keepalive;
mod menu;
mod render;
mod session;
mod telnet;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_proto::config::Config;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::core::ClientContext;

/// Find relays, play the chosen one to stdout and drive the choice from a
/// telnet session.
#[derive(Debug, Parser)]
#[command(name = "radio-client")]
struct Args {
    /// Broadcast or multicast address used to search for relays
    #[arg(short = 'H', long)]
    relay_host: String,
    /// UDP port the relays listen on
    #[arg(short = 'P', long)]
    relay_port: u16,
    /// TCP port for the telnet UI
    #[arg(short = 'p', long)]
    ui_port: u16,
    /// Seconds of silence before the selected relay is dropped
    #[arg(short = 'T', long)]
    timeout: Option<u64>,
    /// Config file (default: ~/.config/radio-relay/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging() -> anyhow::Result<PathBuf> {
    let log_path = relay_proto::platform::log_path("radio-client");
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // stdout is the audio
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,relay_client=debug")),
        )
        .init();
    Ok(log_path)
}

async fn resolve(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("resolving {}:{}", host, port))?
        .find(SocketAddr::is_ipv4)
        .with_context(|| format!("no IPv4 address for {}", host))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_path = init_logging().context("setting up the log file")?;
    eprintln!("radio-client log: {}", log_path.display());

    let mut config = Config::load(args.config.as_deref()).context("loading config")?;
    if let Some(t) = args.timeout {
        config.client.relay_timeout_secs = t;
    }

    let discover_addr = resolve(&args.relay_host, args.relay_port).await?;
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .context("binding relay socket")?;
    socket
        .set_broadcast(true)
        .context("enabling broadcast on relay socket")?;
    let listener = session::bind(args.ui_port).await?;
    info!(
        "client: searching via {}, ui on port {}",
        discover_addr, args.ui_port
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let ctx = Arc::new(ClientContext::new(
        Arc::new(socket),
        discover_addr,
        &config.client,
        cancel.clone(),
    ));
    let ingest = {
        let ctx = ctx.clone();
        let every = config.client.liveness_check();
        tokio::spawn(async move {
            let result = ingest::run(ctx.clone(), tokio::io::stdout(), every).await;
            // no audio output left, so the UI has nothing to control
            ctx.cancel.cancel();
            result
        })
    };
    let keepalive = tokio::spawn(keepalive::run(
        ctx.clone(),
        config.client.keepalive_interval(),
    ));

    let result = session::serve(ctx, listener).await;
    if let Err(e) = &result {
        error!("ui server stopped: {:#}", e);
    }

    // whichever loop stopped first, take the rest down with it
    cancel.cancel();
    let ingest_result = ingest.await.context("relay ingest task panicked")?;
    let keepalive_result = keepalive.await.context("keepalive task panicked")?;

    result.and(ingest_result).and(keepalive_result)
}
