use thiserror::Error;

/// Datagram framing failures.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds the datagram limit")]
    PayloadTooLarge { len: usize },

    /// `declared` is `None` when the header itself was cut short.
    #[error("malformed datagram (declared length {declared:?}, {actual} bytes present)")]
    Malformed {
        declared: Option<usize>,
        actual: usize,
    },
}

/// Upstream stream failures.  Either one ends the fetch session.
#[derive(Debug, Error)]
pub enum IcyError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("upstream read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl IcyError {
    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        IcyError::ProtocolViolation(msg.into())
    }
}
