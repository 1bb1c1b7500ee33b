//! Transport adapter (§4.7): a thin `Transport` trait over libp2p's
//! `libp2p_stream` protocol-multiplexing API, plus an in-memory mock used
//! by the rest of the workspace's tests.

mod libp2p_transport;
mod mock;

pub use libp2p_transport::Libp2pTransport;
pub use mock::{MockNetwork, MockTransport};

use async_trait::async_trait;
use onionmesh_core::{PeerId, Result};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream opened over the transport, type-erased so callers
/// don't need to know whether it came from libp2p or a test double.
pub type BoxedStream = Pin<Box<dyn StreamHalf>>;

pub trait StreamHalf: AsyncRead + AsyncWrite + Unpin + Send {
    /// Aborts the stream without a graceful close handshake, so a peer on
    /// the other end sees the connection simply vanish rather than a clean
    /// FIN — the same shape a hung or crashed peer would produce. The
    /// default does nothing beyond what dropping the stream already does;
    /// concrete transports with a real reset primitive can override it.
    fn reset(&mut self) {}
}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> StreamHalf for T {}

impl std::fmt::Debug for dyn StreamHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamHalf")
    }
}

/// Opens outbound streams and accepts inbound ones under a single
/// application protocol, addressed by `PeerId`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_stream(&self, peer: &PeerId, protocol: &str) -> Result<BoxedStream>;

    /// Blocks until the next inbound stream arrives on `protocol`.
    async fn accept(&self, protocol: &str) -> Result<(PeerId, BoxedStream)>;

    fn local_peer_id(&self) -> PeerId;
}
