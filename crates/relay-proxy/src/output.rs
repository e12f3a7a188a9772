use std::sync::Arc;

use relay_proto::icy::{Block, BlockKind};
use relay_proto::registry::fan_out;
use relay_proto::Kind;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::context::ProxyContext;

/// Where upstream blocks go.
pub enum Output<A, M> {
    /// Audio and metadata to two byte streams (stdout / stderr).
    Stdio { audio: A, metadata: M },
    /// Datagrams to every registered listener.
    Relay {
        ctx: Arc<ProxyContext>,
        socket: Arc<UdpSocket>,
    },
}

pub type ProcessOutput = Output<tokio::io::Stdout, tokio::io::Stderr>;

impl ProcessOutput {
    pub fn stdio() -> Self {
        Output::Stdio {
            audio: tokio::io::stdout(),
            metadata: tokio::io::stderr(),
        }
    }

    pub fn relay(ctx: Arc<ProxyContext>, socket: Arc<UdpSocket>) -> Self {
        Output::Relay { ctx, socket }
    }
}

impl<A, M> Output<A, M>
where
    A: AsyncWrite + Unpin,
    M: AsyncWrite + Unpin,
{
    pub async fn deliver(&mut self, block: &Block) -> anyhow::Result<()> {
        match self {
            Output::Stdio { audio, metadata } => {
                let out: &mut (dyn AsyncWrite + Unpin) = match block.kind {
                    BlockKind::Audio => audio,
                    BlockKind::Metadata => metadata,
                };
                out.write_all(&block.data).await?;
                out.flush().await?;
            }
            Output::Relay { ctx, socket } => {
                let kind = match block.kind {
                    BlockKind::Audio => Kind::Audio,
                    BlockKind::Metadata => Kind::Metadata,
                };
                let sent = fan_out(&ctx.registry, socket.as_ref(), kind, &block.data).await;
                trace!(
                    "output: {:?} block of {} bytes, {} datagrams",
                    kind,
                    block.data.len(),
                    sent
                );
            }
        }
        Ok(())
    }
}
