use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use relay_proto::config::ClientConfig;
use relay_proto::relays::RelayTable;
use relay_proto::{Datagram, Kind};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::action::Target;
use crate::menu::Menu;
use crate::render::Screen;

/// Tells UI sessions to redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// Relay list or selection changed.
    StateUpdated,
    MetadataUpdated,
}

/// Shared by the relay ingest loop, the keepalive emitter and every UI
/// session.  The relay table and the metadata text have separate locks and
/// are never held together or across socket I/O.
pub struct ClientContext {
    pub relays: Mutex<RelayTable>,
    metadata: Mutex<Vec<u8>>,
    metadata_max_len: usize,
    pub socket: Arc<UdpSocket>,
    /// Where a "search" DISCOVER goes (broadcast or multicast address).
    pub discover_addr: SocketAddr,
    pub events: broadcast::Sender<UiEvent>,
    pub cancel: CancellationToken,
}

impl ClientContext {
    pub fn new(
        socket: Arc<UdpSocket>,
        discover_addr: SocketAddr,
        config: &ClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            relays: Mutex::new(RelayTable::new(
                config.max_relays,
                config.relay_timeout(),
                Instant::now(),
            )),
            metadata: Mutex::new(Vec::new()),
            metadata_max_len: config.metadata_max_len,
            socket,
            discover_addr,
            events,
            cancel,
        }
    }

    pub fn notify(&self, event: UiEvent) {
        // no sessions connected is fine
        let _ = self.events.send(event);
    }

    pub async fn set_metadata(&self, payload: &[u8]) {
        {
            let mut metadata = self.metadata.lock().await;
            metadata.clear();
            metadata.extend_from_slice(&payload[..payload.len().min(self.metadata_max_len)]);
        }
        self.notify(UiEvent::MetadataUpdated);
    }

    /// Send a DISCOVER.  Picking a specific relay selects it immediately,
    /// without waiting for its reply.
    pub async fn discover(&self, target: Target) {
        let dest = match target {
            Target::Broadcast => self.discover_addr,
            Target::Relay(endpoint) => {
                let selected = self
                    .relays
                    .lock()
                    .await
                    .select_endpoint(endpoint, Instant::now());
                // redraw either way: a dropped relay may still be on screen
                self.notify(UiEvent::StateUpdated);
                if selected.is_none() {
                    debug!("discover: relay {} dropped before it was picked", endpoint);
                    return;
                }
                endpoint
            }
        };

        let discover = match Datagram::control(Kind::Discover).encode() {
            Ok(d) => d,
            Err(e) => {
                warn!("discover: {}", e);
                return;
            }
        };
        debug!("discover: sending to {}", dest);
        if let Err(e) = self.socket.send_to(&discover, dest).await {
            warn!("discover: send to {} failed: {}", dest, e);
        }
    }

    /// Snapshot what a session should draw, pulling its cursor back into range.
    pub async fn screen(&self, menu: &mut Menu) -> Screen {
        let (relays, endpoints, selected) = {
            let table = self.relays.lock().await;
            let names: Vec<String> = table.entries().iter().map(|e| e.display_name()).collect();
            let endpoints = table.entries().iter().map(|e| e.endpoint).collect();
            (names, endpoints, table.selected())
        };
        menu.clamp(relays.len());
        let metadata = self.metadata.lock().await.clone();
        Screen {
            relays,
            endpoints,
            selected,
            cursor: menu.cursor(),
            metadata,
        }
    }
}
