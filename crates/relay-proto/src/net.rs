use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Connect/accept failures that are worth another attempt.  Anything else is
/// fatal to the session that hit it.
pub const RETRYABLE_KINDS: &[io::ErrorKind] = &[
    io::ErrorKind::NetworkDown,
    io::ErrorKind::NetworkUnreachable,
    io::ErrorKind::HostUnreachable,
    io::ErrorKind::ConnectionAborted,
    io::ErrorKind::ConnectionReset,
    io::ErrorKind::Interrupted,
];

pub fn is_retryable(err: &io::Error) -> bool {
    RETRYABLE_KINDS.contains(&err.kind())
}

/// Somewhere datagrams can be addressed to.  `UdpSocket` in production;
/// tests substitute a recorder.
pub trait DatagramSink {
    fn send_datagram(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;
}

impl DatagramSink for UdpSocket {
    fn send_datagram(
        &self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send {
        self.send_to(buf, target)
    }
}
