//! Shared pieces of the radio relay: datagram framing, ICY stream parsing,
//! the relay-side listener registry and the client-side relay table.

pub mod config;
pub mod datagram;
pub mod error;
pub mod icy;
pub mod net;
pub mod platform;
pub mod registry;
pub mod relays;

pub use datagram::{Datagram, Kind};
pub use error::{FrameError, IcyError};
