use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use relay_proto::net::is_retryable;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::core::{ClientContext, UiEvent};
use crate::menu::Menu;
use crate::render::render;
use crate::telnet::{KeyDecoder, NEGOTIATE};

/// Accept telnet sessions until cancelled.  Every session is joined before
/// this returns.
pub async fn serve(ctx: Arc<ClientContext>, listener: TcpListener) -> anyhow::Result<()> {
    info!("ui: listening on {}", listener.local_addr()?);
    let mut sessions = JoinSet::new();
    let mut result = Ok(());

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            // reap finished sessions so the set does not grow forever
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!("ui: session task failed: {}", e);
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("ui: session from {}", peer);
                    let events = ctx.events.subscribe();
                    let ctx = ctx.clone();
                    sessions.spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = run_session(&ctx, reader, writer, events).await {
                            debug!("ui: session {} ended: {:#}", peer, e);
                        }
                        info!("ui: session {} closed", peer);
                    });
                }
                Err(e) if is_retryable(&e) => debug!("ui: transient accept error: {}", e),
                Err(e) => {
                    error!("ui: accept failed: {}", e);
                    result = Err(e).context("accepting ui sessions");
                    break;
                }
            },
        }
    }

    // sessions watch the same token; a fatal accept error has to stop them too
    ctx.cancel.cancel();
    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            error!("ui: session task failed: {}", e);
        }
    }
    info!("ui: stopped");
    result
}

/// Draw the current state and return the relay endpoints in the order shown.
async fn redraw<W>(
    ctx: &ClientContext,
    menu: &mut Menu,
    writer: &mut W,
) -> anyhow::Result<Vec<SocketAddr>>
where
    W: AsyncWrite + Unpin,
{
    let screen = ctx.screen(menu).await;
    let frame = render(&screen)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(screen.endpoints)
}

/// One telnet connection: keys in, screens out.  Returns when the peer
/// disconnects, "End" is chosen, or the client shuts down.
pub async fn run_session<R, W>(
    ctx: &ClientContext,
    mut reader: R,
    mut writer: W,
    mut events: broadcast::Receiver<UiEvent>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut menu = Menu::default();
    let mut decoder = KeyDecoder::default();
    let mut keys = Vec::new();
    let mut buf = [0u8; 256];

    writer.write_all(&NEGOTIATE).await?;
    let mut shown = redraw(ctx, &mut menu, &mut writer).await?;

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                decoder.feed(&buf[..n], &mut keys);
                for key in keys.drain(..) {
                    match menu.handle(key, &shown) {
                        Action::Redraw => shown = redraw(ctx, &mut menu, &mut writer).await?,
                        Action::Discover(target) => {
                            // the selection change is broadcast back to us as an event
                            ctx.discover(target).await;
                        }
                        Action::Quit => {
                            info!("ui: end selected, shutting down");
                            ctx.cancel.cancel();
                            return Ok(());
                        }
                        Action::Noop => {}
                    }
                }
            }
            event = events.recv() => match event {
                Ok(_) => shown = redraw(ctx, &mut menu, &mut writer).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("ui: session missed {} updates", n);
                    shown = redraw(ctx, &mut menu, &mut writer).await?;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

/// Bind the UI listener on all interfaces.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding ui port {}", addr))
}
