//! Upstream fetch session: connect, request, parse the header, then pump body
//! blocks into the output until end of stream or cancellation.

use std::time::Duration;

use anyhow::Context;
use relay_proto::config::ProxyConfig;
use relay_proto::icy::{self, IcyStream, ReadOptions};
use relay_proto::net::is_retryable;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::output::Output;

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Connect to the upstream, retrying on transient network errors.  With no
/// `timeout` each attempt waits as long as the OS does.
pub async fn connect(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> anyhow::Result<TcpStream> {
    loop {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled while connecting to {}:{}", host, port);
        }

        let attempt = match timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect((host, port))).await,
            None => Ok(TcpStream::connect((host, port)).await),
        };
        match attempt {
            Ok(Ok(stream)) => {
                info!("upstream: connected to {}:{}", host, port);
                return Ok(stream);
            }
            Ok(Err(e)) if is_retryable(&e) => {
                warn!("upstream: connect to {}:{} failed ({}), retrying", host, port, e);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Ok(Err(e)) => {
                return Err(e).with_context(|| format!("connecting to {}:{}", host, port));
            }
            Err(_) => anyhow::bail!("connecting to {}:{} timed out", host, port),
        }
    }
}

/// Send the request and consume the response header.
pub async fn open<S>(
    mut stream: S,
    host: &str,
    resource: &str,
    metadata: bool,
    config: &ProxyConfig,
) -> anyhow::Result<IcyStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&icy::request(host, resource, metadata))
        .await
        .context("sending upstream request")?;

    let opts = ReadOptions {
        buffer_len: config.read_buffer_len,
        max_header_len: config.max_header_len,
        read_timeout: config.upstream_timeout(),
    };
    let stream = IcyStream::open(stream, opts)
        .await
        .context("reading upstream header")?;

    info!(
        "upstream: stream {:?}, metadata interval {:?}",
        stream.session().display_name(),
        stream.session().metaint
    );
    Ok(stream)
}

/// Forward blocks until the upstream ends or `cancel` fires.  The flag is
/// checked between reads; a read in progress is allowed to finish.
pub async fn pump<R, A, M>(
    mut stream: IcyStream<R>,
    output: &mut Output<A, M>,
    cancel: &CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    A: AsyncWrite + Unpin,
    M: AsyncWrite + Unpin,
{
    let mut blocks = Vec::new();
    let mut total: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            info!("upstream: cancelled after {} body bytes", total);
            return Ok(());
        }

        blocks.clear();
        let more = stream
            .next_blocks(&mut blocks)
            .await
            .context("reading upstream body")?;

        for block in &blocks {
            total += block.data.len() as u64;
            output.deliver(block).await?;
        }

        if !more {
            debug!("upstream: end of stream after {} body bytes", total);
            return Ok(());
        }
    }
}
