//! Listeners of a relay, keyed by their UDP endpoint.
//!
//! The ingest loop mutates the registry (`register` / `touch` / `sweep`) and
//! the upstream pump reads it through [`fan_out`].  Both go through one
//! `tokio::sync::Mutex`; the guard only ever covers the map itself, never a
//! socket call.
//!
//! An entry that has never sent a KEEPALIVE (`last_keepalive == None`) does
//! not expire.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::datagram::{encode_chunked, Kind};
use crate::net::DatagramSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerEntry {
    pub endpoint: SocketAddr,
    pub last_keepalive: Option<Instant>,
    pub valid: bool,
}

pub struct ListenerRegistry {
    entries: HashMap<SocketAddr, ListenerEntry>,
    client_timeout: Duration,
}

impl ListenerRegistry {
    pub fn new(client_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            client_timeout,
        }
    }

    /// DISCOVER from `endpoint`.  A new endpoint gets an entry with no
    /// keepalive yet; a known one is refreshed instead of duplicated.
    pub fn register(&mut self, endpoint: SocketAddr, now: Instant) -> ListenerEntry {
        let entry = self
            .entries
            .entry(endpoint)
            .and_modify(|e| {
                e.valid = true;
                e.last_keepalive = Some(now);
            })
            .or_insert_with(|| {
                debug!("registry: new listener {}", endpoint);
                ListenerEntry {
                    endpoint,
                    last_keepalive: None,
                    valid: true,
                }
            });
        *entry
    }

    /// KEEPALIVE from `endpoint`.  Unknown endpoints are not inserted.
    pub fn touch(&mut self, endpoint: SocketAddr, now: Instant) -> bool {
        match self.entries.get_mut(&endpoint) {
            Some(e) => {
                e.valid = true;
                e.last_keepalive = Some(now);
                true
            }
            None => false,
        }
    }

    /// Invalidate every entry whose last keepalive is older than the client
    /// timeout, except `current` (the sender being handled right now), then
    /// purge invalid entries.  Returns how many were removed.
    pub fn sweep(&mut self, now: Instant, current: Option<SocketAddr>) -> usize {
        let timeout = self.client_timeout;
        for entry in self.entries.values_mut() {
            if Some(entry.endpoint) == current {
                continue;
            }
            if let Some(seen) = entry.last_keepalive {
                if now.saturating_duration_since(seen) > timeout {
                    entry.valid = false;
                }
            }
        }

        let before = self.entries.len();
        self.entries.retain(|addr, e| {
            if !e.valid {
                debug!("registry: dropping silent listener {}", addr);
            }
            e.valid
        });
        before - self.entries.len()
    }

    pub fn get(&self, endpoint: &SocketAddr) -> Option<&ListenerEntry> {
        self.entries.get(endpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Endpoints that should receive the next block.
    pub fn valid_endpoints(&self) -> Vec<SocketAddr> {
        self.entries
            .values()
            .filter(|e| e.valid)
            .map(|e| e.endpoint)
            .collect()
    }
}

/// Send `payload` as `kind` datagrams to every valid listener.
///
/// The endpoint list is snapshotted under the lock and the sends happen after
/// it is released.  A failed send is logged and the remaining listeners still
/// get the data.  Returns the number of datagrams sent successfully.
pub async fn fan_out<S: DatagramSink>(
    registry: &Mutex<ListenerRegistry>,
    sink: &S,
    kind: Kind,
    payload: &[u8],
) -> usize {
    let targets = registry.lock().await.valid_endpoints();
    if targets.is_empty() {
        return 0;
    }

    let mut sent = 0;
    for datagram in encode_chunked(kind, payload) {
        for target in &targets {
            match sink.send_datagram(&datagram, *target).await {
                Ok(_) => sent += 1,
                Err(e) => warn!("registry: send to {} failed: {}", target, e),
            }
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_is_idempotent() {
        let now = Instant::now();
        let mut reg = ListenerRegistry::new(Duration::from_secs(5));
        let first = reg.register(addr(1000), now);
        assert_eq!(first.last_keepalive, None);
        assert!(first.valid);

        let later = now + Duration::from_secs(2);
        let second = reg.register(addr(1000), later);
        assert_eq!(reg.len(), 1);
        assert_eq!(second.last_keepalive, Some(later));
    }

    #[test]
    fn test_touch_unknown_is_noop() {
        let mut reg = ListenerRegistry::new(Duration::from_secs(5));
        assert!(!reg.touch(addr(2000), Instant::now()));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_sweep_purges_expired() {
        let t0 = Instant::now();
        let mut reg = ListenerRegistry::new(Duration::from_secs(5));
        reg.register(addr(1), t0);
        reg.touch(addr(1), t0);

        assert_eq!(reg.sweep(t0 + Duration::from_secs(5), None), 0);
        assert_eq!(reg.sweep(t0 + Duration::from_secs(6), None), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_sweep_spares_current_sender() {
        let t0 = Instant::now();
        let mut reg = ListenerRegistry::new(Duration::from_secs(1));
        reg.register(addr(1), t0);
        reg.touch(addr(1), t0);
        reg.register(addr(2), t0);
        reg.touch(addr(2), t0);

        let late = t0 + Duration::from_secs(10);
        assert_eq!(reg.sweep(late, Some(addr(1))), 1);
        assert!(reg.get(&addr(1)).is_some());
        assert!(reg.get(&addr(2)).is_none());
    }

    #[test]
    fn test_never_kept_alive_does_not_expire() {
        let t0 = Instant::now();
        let mut reg = ListenerRegistry::new(Duration::from_secs(1));
        reg.register(addr(7), t0);
        assert_eq!(reg.sweep(t0 + Duration::from_secs(3600), None), 0);
        assert_eq!(reg.valid_endpoints(), vec![addr(7)]);
    }
}
