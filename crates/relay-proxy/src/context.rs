use std::future::Future;
use std::time::Duration;

use relay_proto::datagram::MAX_PAYLOAD;
use relay_proto::registry::ListenerRegistry;
use relay_proto::{Datagram, FrameError, Kind};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared by the upstream pump and the listener ingest loop.
pub struct ProxyContext {
    pub registry: Mutex<ListenerRegistry>,
    pub cancel: CancellationToken,
    /// Encoded IAM reply, built once from the upstream name.
    pub iam: Vec<u8>,
}

impl ProxyContext {
    pub fn new(
        source_name: &[u8],
        client_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, FrameError> {
        let name = &source_name[..source_name.len().min(MAX_PAYLOAD)];
        let iam = Datagram::new(Kind::IAm, name).encode()?;
        Ok(Self {
            registry: Mutex::new(ListenerRegistry::new(client_timeout)),
            cancel,
            iam,
        })
    }

    /// Spawn a task whose exit, for any reason including a panic, cancels
    /// the whole relay session.
    pub fn spawn_linked<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.cancel.clone().drop_guard();
        tokio::spawn(async move {
            let _guard = guard;
            task.await
        })
    }
}
