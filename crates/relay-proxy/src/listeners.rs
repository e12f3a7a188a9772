//! Listener ingest loop: answers DISCOVER, records KEEPALIVE and sweeps
//! silent listeners out of the registry.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use relay_proto::datagram::{Datagram, Kind, RECV_BUFFER_LEN};
use relay_proto::net::{is_retryable, DatagramSink};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace, warn};

use crate::context::ProxyContext;

/// How often the registry is swept when no datagram arrives.
pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

pub async fn bind(addr: SocketAddr, multicast: Option<Ipv4Addr>) -> anyhow::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("binding listener socket {}", addr))?;
    if let Some(group) = multicast {
        socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .with_context(|| format!("joining multicast group {}", group))?;
        info!("listeners: joined multicast group {}", group);
    }
    info!("listeners: waiting for DISCOVER on {}", socket.local_addr()?);
    Ok(socket)
}

pub async fn run(ctx: Arc<ProxyContext>, socket: Arc<UdpSocket>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let mut sweep = tokio::time::interval(IDLE_SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = sweep.tick() => {
                let removed = ctx.registry.lock().await.sweep(Instant::now(), None);
                if removed > 0 {
                    debug!("listeners: idle sweep removed {}", removed);
                }
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => handle_datagram(&ctx, socket.as_ref(), &buf[..n], from).await,
                Err(e) if is_retryable(&e) => {
                    debug!("listeners: transient receive error: {}", e);
                }
                Err(e) => {
                    error!("listeners: receive failed: {}", e);
                    return Err(e).context("receiving from listeners");
                }
            },
        }
    }

    info!("listeners: ingest loop stopped");
    Ok(())
}

/// Handle one raw datagram from `from`.  Malformed input is dropped.
pub async fn handle_datagram<S: DatagramSink>(
    ctx: &ProxyContext,
    sink: &S,
    raw: &[u8],
    from: SocketAddr,
) {
    let datagram = match Datagram::decode(raw) {
        Ok(d) => d,
        Err(e) => {
            debug!("listeners: dropping datagram from {}: {}", from, e);
            return;
        }
    };

    let now = Instant::now();
    match datagram.kind {
        Kind::Discover => {
            {
                let mut registry = ctx.registry.lock().await;
                registry.register(from, now);
                registry.sweep(now, Some(from));
            }
            if let Err(e) = sink.send_datagram(&ctx.iam, from).await {
                warn!("listeners: IAM to {} failed: {}", from, e);
            }
        }
        Kind::KeepAlive => {
            let mut registry = ctx.registry.lock().await;
            if !registry.touch(from, now) {
                trace!("listeners: keepalive from unknown {}", from);
            }
            registry.sweep(now, Some(from));
        }
        other => trace!("listeners: ignoring {:?} from {}", other, from),
    }
}
