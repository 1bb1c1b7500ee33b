//! Shared harness for the onion-routing integration tests: builds a small
//! mock-transport network of nodes, each running the relay state machine,
//! and wires up loopback TCP services for the exit hop to dial into.

use std::collections::HashMap;
use std::sync::Arc;

use onionmesh_core::{Member, NetworkMap, PeerId};
use onionmesh_crypto::{Identity, OnionKeypair, SigningKeypair};
use onionmesh_relay::{serve_connection, ExitAllowlist, RelayConfig, ReplayCache};
use onionmesh_transport::{MockNetwork, MockTransport, Transport};

pub struct TestNode {
    pub identity: Identity,
    pub transport: Arc<MockTransport>,
}

impl TestNode {
    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id()
    }
}

/// Spins up `count` mock-transport nodes sharing one `MockNetwork`, each
/// with a distinct deterministic identity.
pub async fn spawn_nodes(network: &MockNetwork, count: u8) -> Vec<TestNode> {
    let mut nodes = Vec::with_capacity(count as usize);
    for seed in 1..=count {
        let signing = SigningKeypair::from_bytes(&[seed; 32]);
        let onion = OnionKeypair::generate();
        let identity = Identity { signing, onion };
        let transport = Arc::new(MockTransport::new(network.clone(), identity.peer_id()).await);
        nodes.push(TestNode { identity, transport });
    }
    nodes
}

pub fn build_network_map(nodes: &[TestNode], trusted_relay_indices: &[usize]) -> NetworkMap {
    let mut peers = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        peers.insert(
            node.peer_id(),
            Member {
                address: format!("mock://node-{i}"),
                onion_public: node.identity.onion.public_key_bytes(),
                trusted_relay: trusted_relay_indices.contains(&i),
            },
        );
    }
    NetworkMap::new(peers)
}

/// Spawns the relay accept loop for one node: every inbound stream is
/// handed to `serve_connection` on its own task.
pub fn spawn_relay_loop(node: &TestNode, allowlist: ExitAllowlist) {
    let transport: Arc<dyn Transport> = node.transport.clone();
    let config = Arc::new(RelayConfig {
        onion_secret: node.identity.onion.secret.clone(),
        allowlist,
        replay_cache: Arc::new(ReplayCache::default()),
        transport: transport.clone(),
    });

    tokio::spawn(async move {
        loop {
            match transport.accept(onionmesh_core::PROXY_RELAY_PROTOCOL).await {
                Ok((_, stream)) => {
                    let config = config.clone();
                    tokio::spawn(async move {
                        serve_connection(stream, &config).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}
