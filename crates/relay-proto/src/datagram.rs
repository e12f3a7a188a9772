//! Datagram framing shared by the relay and its listeners.
//!
//! Wire form (big-endian):
//!
//! ```text
//!   0        2        4
//!   ├ kind ──┼ length ┼ payload (length bytes, ≤ 1020) ┤
//! ```
//!
//! A datagram whose declared length does not match the bytes that follow the
//! header is rejected as a whole; there is no partial decoding.

use crate::error::FrameError;

/// Size of the fixed `kind` + `length` header.
pub const HEADER_LEN: usize = 4;

/// Largest datagram we ever put on the wire.
pub const MAX_DATAGRAM_LEN: usize = 1024;

/// Largest payload a single datagram can carry.
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM_LEN - HEADER_LEN;

/// Receive buffer size; anything larger than a datagram we send is malformed
/// anyway, but the buffer must hold it to notice.
pub const RECV_BUFFER_LEN: usize = 0x10000;

/// Message kind carried in the first header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Internal placeholder, never sent.
    None,
    Discover,
    IAm,
    KeepAlive,
    Audio,
    Metadata,
    /// A code we don't know (including the reserved 5).  Decoded so callers
    /// can drop it, never produced by us.
    Unknown(u16),
}

impl Kind {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Kind::None,
            1 => Kind::Discover,
            2 => Kind::IAm,
            3 => Kind::KeepAlive,
            4 => Kind::Audio,
            6 => Kind::Metadata,
            other => Kind::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Kind::None => 0,
            Kind::Discover => 1,
            Kind::IAm => 2,
            Kind::KeepAlive => 3,
            Kind::Audio => 4,
            Kind::Metadata => 6,
            Kind::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub kind: Kind,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(kind: Kind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A header-only datagram (DISCOVER, KEEPALIVE).
    pub fn control(kind: Kind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode(self.kind, &self.payload)
    }

    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        decode(data)
    }
}

pub fn encode(kind: Kind, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: payload.len(),
        });
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&kind.code().to_be_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<Datagram, FrameError> {
    if data.len() < HEADER_LEN {
        return Err(FrameError::Malformed {
            declared: None,
            actual: data.len(),
        });
    }
    let kind = u16::from_be_bytes([data[0], data[1]]);
    let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
    let body = &data[HEADER_LEN..];
    if body.len() != declared {
        return Err(FrameError::Malformed {
            declared: Some(declared),
            actual: body.len(),
        });
    }
    Ok(Datagram {
        kind: Kind::from_code(kind),
        payload: body.to_vec(),
    })
}

/// Split an arbitrarily long block into consecutive encoded datagrams of at
/// most [`MAX_PAYLOAD`] bytes each.  An empty block yields no datagrams.
pub fn encode_chunked(kind: Kind, payload: &[u8]) -> impl Iterator<Item = Vec<u8>> + '_ {
    payload.chunks(MAX_PAYLOAD).map(move |piece| {
        let mut out = Vec::with_capacity(HEADER_LEN + piece.len());
        out.extend_from_slice(&kind.code().to_be_bytes());
        out.extend_from_slice(&(piece.len() as u16).to_be_bytes());
        out.extend_from_slice(piece);
        out
    })
}
