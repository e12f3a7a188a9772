//! Client-side table of discovered relays and the failover state machine.
//!
//! Transitions:
//!   NoSelection -> Selected(i)        user picks relay i (on send, not reply)
//!   Selected(i) -> Selected(j)        user picks another relay
//!   Selected(i) -> NoSelection        no AUDIO/METADATA from i for > timeout;
//!                                     slot i is removed (last entry moves in)
//!
//! Indices are 0-based positions in [`RelayTable::entries`].

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::datagram::{Datagram, Kind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEntry {
    pub endpoint: SocketAddr,
    pub name: Vec<u8>,
}

impl RelayEntry {
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    NoSelection,
    Selected(usize),
}

/// Payload that should leave the table after a datagram was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    Audio(Vec<u8>),
    Metadata(Vec<u8>),
}

/// Outcome of [`RelayTable::handle`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub forward: Option<Forward>,
    /// Relay list or selection changed; the UI should re-render.
    pub table_changed: bool,
}

pub struct RelayTable {
    entries: Vec<RelayEntry>,
    capacity: usize,
    state: FailoverState,
    last_data: Instant,
    timeout: Duration,
}

impl RelayTable {
    pub fn new(capacity: usize, timeout: Duration, now: Instant) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            state: FailoverState::NoSelection,
            last_data: now,
            timeout,
        }
    }

    /// Handle one inbound datagram from `from`, then run the liveness check.
    pub fn handle(&mut self, from: SocketAddr, datagram: Datagram, now: Instant) -> Dispatch {
        let mut dispatch = Dispatch::default();

        match datagram.kind {
            Kind::Audio | Kind::Metadata => {
                if self.selected_endpoint() == Some(from) {
                    self.last_data = now;
                    dispatch.forward = Some(match datagram.kind {
                        Kind::Audio => Forward::Audio(datagram.payload),
                        _ => Forward::Metadata(datagram.payload),
                    });
                }
            }
            Kind::IAm => {
                dispatch.table_changed = self.observe(from, datagram.payload);
            }
            _ => {}
        }

        dispatch.table_changed |= self.check_liveness(now);
        dispatch
    }

    /// Record an IAM.  Returns `true` if the table changed.  A new relay is
    /// dropped silently when the table is full.
    pub fn observe(&mut self, endpoint: SocketAddr, name: Vec<u8>) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.endpoint == endpoint) {
            if entry.name == name {
                return false;
            }
            entry.name = name;
            return true;
        }

        if self.entries.len() >= self.capacity {
            debug!("relays: table full, ignoring {}", endpoint);
            return false;
        }

        info!(
            "relays: discovered {} ({})",
            endpoint,
            String::from_utf8_lossy(&name)
        );
        self.entries.push(RelayEntry { endpoint, name });
        true
    }

    /// Demote the selected relay if it has been silent for too long.
    /// Returns `true` when a demotion happened.
    pub fn check_liveness(&mut self, now: Instant) -> bool {
        let FailoverState::Selected(idx) = self.state else {
            return false;
        };
        if now.saturating_duration_since(self.last_data) <= self.timeout {
            return false;
        }

        let gone = self.entries.swap_remove(idx);
        info!(
            "relays: {} ({}) went silent, dropping it",
            gone.endpoint,
            gone.display_name()
        );
        self.state = FailoverState::NoSelection;
        true
    }

    /// Select relay `idx` and return where the DISCOVER should go.  The data
    /// timer restarts so the new relay gets a full window to answer.
    pub fn select(&mut self, idx: usize, now: Instant) -> Option<SocketAddr> {
        let endpoint = self.entries.get(idx)?.endpoint;
        self.state = FailoverState::Selected(idx);
        self.last_data = now;
        Some(endpoint)
    }

    /// Select the relay at `endpoint`, wherever it sits in the table now.
    /// `None` when it has been dropped since the caller last looked.
    pub fn select_endpoint(&mut self, endpoint: SocketAddr, now: Instant) -> Option<usize> {
        let idx = self.entries.iter().position(|e| e.endpoint == endpoint)?;
        self.select(idx, now);
        Some(idx)
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    pub fn selected(&self) -> Option<usize> {
        match self.state {
            FailoverState::Selected(idx) => Some(idx),
            FailoverState::NoSelection => None,
        }
    }

    pub fn selected_endpoint(&self) -> Option<SocketAddr> {
        self.selected().map(|idx| self.entries[idx].endpoint)
    }

    pub fn entries(&self) -> &[RelayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
