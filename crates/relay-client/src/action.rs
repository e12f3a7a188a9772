//! Keys the UI understands and what they turn into.

use std::net::SocketAddr;

/// Decoded terminal input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Enter,
}

/// Where a DISCOVER goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The configured broadcast/multicast address ("search" line).
    Broadcast,
    /// The relay the user picked from the screen; selects it right away.
    Relay(SocketAddr),
}

/// Produced by the menu; the session dispatches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Redraw,
    Discover(Target),
    Quit,
    Noop,
}
