use std::sync::Arc;
use std::time::Duration;

use relay_proto::{Datagram, Kind};
use tracing::{debug, info, warn};

use crate::core::ClientContext;

/// Periodically tell the selected relay we are still listening.
pub async fn run(ctx: Arc<ClientContext>, every: Duration) -> anyhow::Result<()> {
    let keepalive = Datagram::control(Kind::KeepAlive).encode()?;
    let mut tick = tokio::time::interval(every);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tick.tick() => {
                let Some(relay) = ctx.relays.lock().await.selected_endpoint() else {
                    continue;
                };
                debug!("keepalive: -> {}", relay);
                if let Err(e) = ctx.socket.send_to(&keepalive, relay).await {
                    warn!("keepalive: send to {} failed: {}", relay, e);
                }
            }
        }
    }

    info!("keepalive: stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::test_context;
    use relay_proto::datagram::decode;
    use std::time::Instant;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_silent_until_a_relay_is_selected() {
        let ctx = test_context("127.0.0.1:9".parse().unwrap()).await;
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        ctx.relays
            .lock()
            .await
            .observe(relay.local_addr().unwrap(), b"r".to_vec());
        let task = tokio::spawn(run(ctx.clone(), Duration::from_millis(20)));

        // several ticks pass with a known but unselected relay
        let mut buf = [0u8; 16];
        let quiet =
            tokio::time::timeout(Duration::from_millis(150), relay.recv_from(&mut buf)).await;
        assert!(quiet.is_err(), "keepalive sent with no relay selected");

        ctx.relays.lock().await.select(0, Instant::now());
        let (n, from) = tokio::time::timeout(Duration::from_secs(2), relay.recv_from(&mut buf))
            .await
            .expect("keepalive")
            .unwrap();
        assert_eq!(from, ctx.socket.local_addr().unwrap());
        let datagram = decode(&buf[..n]).unwrap();
        assert_eq!(datagram.kind, Kind::KeepAlive);
        assert!(datagram.payload.is_empty());

        ctx.cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_cancel_without_selection() {
        let ctx = test_context("127.0.0.1:9".parse().unwrap()).await;
        ctx.cancel.cancel();
        run(ctx, Duration::from_millis(10)).await.unwrap();
    }
}
