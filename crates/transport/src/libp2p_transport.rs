use async_trait::async_trait;
use futures::StreamExt;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{identity, Multiaddr, PeerId as Libp2pPeerId, SwarmBuilder};
use onionmesh_core::{OnionMeshError, PeerId, Result};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::compat::FuturesAsyncReadCompatExt;

use crate::{BoxedStream, Transport};

#[derive(NetworkBehaviour)]
struct OnionMeshBehaviour {
    stream: libp2p_stream::Behaviour,
    identify: libp2p::identify::Behaviour,
}

/// Production `Transport` backed by a libp2p swarm running
/// `libp2p_stream` for protocol multiplexing. The swarm is driven by a
/// background task; this handle only exchanges control messages and
/// accepted-stream notifications with it.
pub struct Libp2pTransport {
    local_peer_id: PeerId,
    control: libp2p_stream::Control,
    known_addrs: Mutex<HashMap<PeerId, Multiaddr>>,
    incoming: Mutex<mpsc::Receiver<(PeerId, BoxedStream)>>,
}

impl Libp2pTransport {
    /// Spawns the swarm driver task and returns a handle to it. `listen_addr`
    /// is where this node accepts inbound connections; `protocol` is the
    /// single application protocol used for every onion relay hop.
    pub async fn bind(listen_addr: Multiaddr, protocol: &'static str) -> Result<Self> {
        let keypair = identity::Keypair::generate_ed25519();
        let local_libp2p_id = Libp2pPeerId::from(keypair.public());
        let local_peer_id = PeerId::from_bytes(local_libp2p_id.to_bytes());

        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                Default::default(),
                libp2p::noise::Config::new,
                libp2p::yamux::Config::default,
            )
            .map_err(|e| OnionMeshError::TransportError(e.to_string()))?
            .with_behaviour(|key| OnionMeshBehaviour {
                stream: libp2p_stream::Behaviour::new(),
                identify: libp2p::identify::Behaviour::new(libp2p::identify::Config::new(
                    "/onionmesh/1.0.0".into(),
                    key.public(),
                )),
            })
            .map_err(|e| OnionMeshError::TransportError(e.to_string()))?
            .build();

        swarm
            .listen_on(listen_addr)
            .map_err(|e| OnionMeshError::TransportError(e.to_string()))?;

        let control = swarm.behaviour().stream.new_control();
        let mut incoming_control = control.clone();
        let proto = libp2p::StreamProtocol::new(protocol);
        let mut incoming_streams = incoming_control
            .accept(proto)
            .map_err(|e| OnionMeshError::TransportError(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = swarm.select_next_some() => {
                        if let SwarmEvent::IncomingConnectionError { .. } = event {
                            tracing::warn!("inbound connection failed");
                        }
                    }
                    Some((peer, stream)) = incoming_streams.next() => {
                        let peer_id = PeerId::from_bytes(peer.to_bytes());
                        let boxed: BoxedStream = Box::pin(stream.compat());
                        if tx.send((peer_id, boxed)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            local_peer_id,
            control,
            known_addrs: Mutex::new(HashMap::new()),
            incoming: Mutex::new(rx),
        })
    }

    /// Records the dial address for a peer so `open_stream` can find it.
    /// The daemon populates this from the static network map at startup.
    pub async fn register_peer(&self, peer: PeerId, addr: Multiaddr) {
        self.known_addrs.lock().await.insert(peer, addr);
    }
}

#[async_trait]
impl Transport for Libp2pTransport {
    async fn open_stream(&self, peer: &PeerId, protocol: &str) -> Result<BoxedStream> {
        let libp2p_id = Libp2pPeerId::from_bytes(peer.as_bytes())
            .map_err(|_| OnionMeshError::UnknownPeer)?;
        let proto = libp2p::StreamProtocol::new(Box::leak(protocol.to_string().into_boxed_str()));
        let mut control = self.control.clone();
        let stream = control
            .open_stream(libp2p_id, proto)
            .await
            .map_err(|e| OnionMeshError::DialFailed(e.to_string()))?;
        Ok(Box::pin(stream.compat()))
    }

    async fn accept(&self, _protocol: &str) -> Result<(PeerId, BoxedStream)> {
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| OnionMeshError::TransportError("swarm driver exited".into()))
    }

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id.clone()
    }
}
