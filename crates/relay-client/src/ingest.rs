//! Datagrams from relays: IAM updates the table, AUDIO from the selected relay
//! goes to the audio output, METADATA to the UI.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use relay_proto::datagram::{Datagram, RECV_BUFFER_LEN};
use relay_proto::net::is_retryable;
use relay_proto::relays::Forward;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use crate::core::{ClientContext, UiEvent};

pub async fn run<W>(
    ctx: Arc<ClientContext>,
    mut audio: W,
    liveness_every: Duration,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let mut liveness = tokio::time::interval(liveness_every);
    liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = liveness.tick() => {
                let demoted = ctx.relays.lock().await.check_liveness(Instant::now());
                if demoted {
                    ctx.notify(UiEvent::StateUpdated);
                }
            }
            received = ctx.socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => handle_datagram(&ctx, &buf[..n], from, &mut audio).await?,
                Err(e) if is_retryable(&e) => debug!("ingest: transient receive error: {}", e),
                Err(e) => {
                    error!("ingest: receive failed: {}", e);
                    return Err(e).context("receiving from relays");
                }
            },
        }
    }

    info!("ingest: stopped");
    Ok(())
}

pub async fn handle_datagram<W>(
    ctx: &ClientContext,
    raw: &[u8],
    from: SocketAddr,
    audio: &mut W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let datagram = match Datagram::decode(raw) {
        Ok(d) => d,
        Err(e) => {
            debug!("ingest: dropping datagram from {}: {}", from, e);
            return Ok(());
        }
    };

    let dispatch = ctx.relays.lock().await.handle(from, datagram, Instant::now());
    if dispatch.table_changed {
        ctx.notify(UiEvent::StateUpdated);
    }

    match dispatch.forward {
        Some(Forward::Audio(payload)) => {
            audio.write_all(&payload).await.context("writing audio")?;
            audio.flush().await.context("writing audio")?;
        }
        Some(Forward::Metadata(payload)) => ctx.set_metadata(&payload).await,
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::test_context;
    use crate::menu::Menu;
    use relay_proto::config::ClientConfig;
    use relay_proto::Kind;
    use tokio::net::UdpSocket;
    use tokio_util::sync::CancellationToken;

    fn encode(kind: Kind, payload: &[u8]) -> Vec<u8> {
        Datagram::new(kind, payload).encode().unwrap()
    }

    async fn feed(
        ctx: &ClientContext,
        from: SocketAddr,
        kind: Kind,
        payload: &[u8],
        audio: &mut Vec<u8>,
    ) {
        handle_datagram(ctx, &encode(kind, payload), from, audio)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_iam_then_audio_from_selected() {
        let ctx = test_context("127.0.0.1:9".parse().unwrap()).await;
        let relay: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let stranger: SocketAddr = "127.0.0.1:5002".parse().unwrap();
        let mut audio = Vec::new();

        feed(&ctx, relay, Kind::IAm, b"Jazz", &mut audio).await;
        assert_eq!(ctx.relays.lock().await.len(), 1);

        // nothing selected yet
        feed(&ctx, relay, Kind::Audio, b"early", &mut audio).await;
        assert!(audio.is_empty());

        ctx.relays.lock().await.select(0, Instant::now());
        feed(&ctx, relay, Kind::Audio, b"pcm1", &mut audio).await;
        feed(&ctx, stranger, Kind::Audio, b"intruder", &mut audio).await;
        feed(&ctx, relay, Kind::Audio, b"pcm2", &mut audio).await;
        assert_eq!(audio, b"pcm1pcm2");

        feed(&ctx, relay, Kind::Metadata, b"title", &mut audio).await;
        let screen = ctx.screen(&mut Menu::default()).await;
        assert_eq!(screen.metadata, b"title");
        assert_eq!(screen.selected, Some(0));
    }

    #[tokio::test]
    async fn test_malformed_is_dropped() {
        let ctx = test_context("127.0.0.1:9".parse().unwrap()).await;
        let from: SocketAddr = "127.0.0.1:5003".parse().unwrap();
        let mut audio = Vec::new();
        handle_datagram(&ctx, &[0, 2, 0, 10, b'x'], from, &mut audio).await.unwrap();
        assert_eq!(ctx.relays.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn test_silent_relay_demoted_by_tick() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let config = ClientConfig {
            relay_timeout_secs: 0,
            ..ClientConfig::default()
        };
        let ctx = Arc::new(ClientContext::new(
            socket,
            "127.0.0.1:9".parse().unwrap(),
            &config,
            CancellationToken::new(),
        ));
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        {
            let mut table = ctx.relays.lock().await;
            table.observe(relay.local_addr().unwrap(), b"Gone".to_vec());
            table.select(0, Instant::now());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut events = ctx.events.subscribe();
        let task = tokio::spawn(run(ctx.clone(), Vec::new(), Duration::from_millis(20)));

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("demotion event")
            .unwrap();
        assert_eq!(event, UiEvent::StateUpdated);
        assert_eq!(ctx.relays.lock().await.len(), 0);
        assert_eq!(ctx.relays.lock().await.selected(), None);

        ctx.cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_loop_receives_over_udp() {
        let ctx = test_context("127.0.0.1:9".parse().unwrap()).await;
        let client_addr = ctx.socket.local_addr().unwrap();
        let mut events = ctx.events.subscribe();
        let task = tokio::spawn(run(ctx.clone(), Vec::new(), Duration::from_secs(1)));

        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        relay.send_to(&encode(Kind::IAm, b"Live"), client_addr).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("table update")
            .unwrap();
        assert_eq!(event, UiEvent::StateUpdated);
        assert_eq!(ctx.relays.lock().await.entries()[0].name, b"Live");

        ctx.cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
