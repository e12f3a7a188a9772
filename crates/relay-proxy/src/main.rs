mod context;
mod listeners;
mod output;
mod upstream;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use relay_proto::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::context::ProxyContext;
use crate::output::ProcessOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    Yes,
    No,
}

/// Fetch an ICY stream and either play it to stdout/stderr or relay it to
/// UDP listeners.
#[derive(Debug, Parser)]
#[command(name = "radio-proxy", disable_help_flag = true)]
struct Args {
    /// Upstream host
    #[arg(short = 'h', long)]
    host: String,
    /// Resource path on the upstream, e.g. /stream
    #[arg(short = 'r', long)]
    resource: String,
    /// Upstream TCP port
    #[arg(short = 'p', long)]
    port: u16,
    /// Ask the upstream for embedded metadata
    #[arg(short = 'm', long, value_enum, default_value = "no")]
    metadata: Toggle,
    /// Upstream connect and read timeout in seconds; 0 disables it
    #[arg(short = 't', long)]
    timeout: Option<u64>,
    /// UDP port to serve listeners on; without it the stream goes to stdout
    #[arg(short = 'P', long)]
    listen_port: Option<u16>,
    /// Multicast group to join on the listener socket
    #[arg(short = 'B', long, requires = "listen_port")]
    multicast: Option<Ipv4Addr>,
    /// Seconds without KEEPALIVE before a listener is dropped
    #[arg(short = 'T', long, requires = "listen_port")]
    client_timeout: Option<u64>,
    /// Config file (default: ~/.config/radio-relay/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn init_logging() -> anyhow::Result<PathBuf> {
    let log_path = relay_proto::platform::log_path("radio-proxy");
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // stdout/stderr carry the stream itself, so logs only go to the file
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,relay_proxy=debug")),
        )
        .init();
    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_path = init_logging().context("setting up the log file")?;
    eprintln!("radio-proxy log: {}", log_path.display());

    let mut config = Config::load(args.config.as_deref()).context("loading config")?;
    if let Some(t) = args.timeout {
        config.proxy.upstream_timeout_secs = t;
    }
    if let Some(t) = args.client_timeout {
        config.proxy.client_timeout_secs = t;
    }

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

    let tcp = upstream::connect(
        &args.host,
        args.port,
        config.proxy.upstream_timeout(),
        &cancel,
    )
    .await?;
    let stream = upstream::open(
        tcp,
        &args.host,
        &args.resource,
        args.metadata == Toggle::Yes,
        &config.proxy,
    )
    .await?;

    let Some(listen_port) = args.listen_port else {
        let mut output = ProcessOutput::stdio();
        return upstream::pump(stream, &mut output, &cancel).await;
    };

    let ctx = ProxyContext::new(
        &stream.session().source_name,
        config.proxy.client_timeout(),
        cancel.clone(),
    )
    .context("encoding IAM reply")?;
    let ctx = Arc::new(ctx);
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, listen_port));
    let socket = Arc::new(listeners::bind(bind_addr, args.multicast).await?);
    // a dead listener loop takes the upstream session down with it
    let ingest = ctx.spawn_linked(listeners::run(ctx.clone(), socket.clone()));

    let mut output = ProcessOutput::relay(ctx, socket.clone());
    let result = upstream::pump(stream, &mut output, &cancel).await;
    if let Err(e) = &result {
        error!("upstream session ended: {:#}", e);
    }

    // the ingest loop has nothing to serve once the upstream is gone
    cancel.cancel();
    let ingest_result = ingest.await.context("listener task panicked")?;

    if let Some(group) = args.multicast {
        socket
            .leave_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .with_context(|| format!("leaving multicast group {}", group))?;
    }

    result.and(ingest_result)
}
