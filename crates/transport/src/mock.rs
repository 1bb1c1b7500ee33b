use async_trait::async_trait;
use onionmesh_core::{OnionMeshError, PeerId, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::duplex;
use tokio::sync::{mpsc, Mutex};

use crate::{BoxedStream, Transport};

type Inbox = mpsc::Sender<(PeerId, BoxedStream)>;

/// Shared registry connecting every `MockTransport` in a test, standing in
/// for the libp2p swarm's connection table.
#[derive(Default, Clone)]
pub struct MockNetwork {
    inboxes: Arc<Mutex<HashMap<PeerId, Inbox>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

/// In-memory `Transport` used by integration tests: `open_stream` creates
/// a `tokio::io::duplex` pair and hands one half to the target peer's
/// `accept` queue.
pub struct MockTransport {
    peer_id: PeerId,
    network: MockNetwork,
    incoming: Mutex<mpsc::Receiver<(PeerId, BoxedStream)>>,
}

impl MockTransport {
    pub async fn new(network: MockNetwork, peer_id: PeerId) -> Self {
        let (tx, rx) = mpsc::channel(64);
        network.inboxes.lock().await.insert(peer_id.clone(), tx);
        Self {
            peer_id,
            network,
            incoming: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_stream(&self, peer: &PeerId, _protocol: &str) -> Result<BoxedStream> {
        let inbox = {
            let inboxes = self.network.inboxes.lock().await;
            inboxes
                .get(peer)
                .cloned()
                .ok_or(OnionMeshError::UnknownPeer)?
        };

        let (local_half, remote_half) = duplex(8192);
        let remote_boxed: BoxedStream = Box::pin(remote_half);
        inbox
            .send((self.peer_id.clone(), remote_boxed))
            .await
            .map_err(|_| OnionMeshError::DialFailed("peer inbox closed".into()))?;

        Ok(Box::pin(local_half))
    }

    async fn accept(&self, _protocol: &str) -> Result<(PeerId, BoxedStream)> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| OnionMeshError::TransportError("mock network closed".into()))
    }

    fn local_peer_id(&self) -> PeerId {
        self.peer_id.clone()
    }
}
