//! Node daemon: loads configuration and identity, binds the transport, and
//! runs the relay accept loop plus (for client-capable modes) the SOCKS5
//! frontend.

mod socks5;

pub use socks5::Socks5Frontend;

use std::sync::Arc;

use libp2p::Multiaddr;
use onionmesh_core::{OnionMeshError, PeerId, PROXY_RELAY_PROTOCOL};
use onionmesh_relay::{serve_connection, ExitAllowlist, RelayConfig, ReplayCache};
use onionmesh_settings::{load_network_map, NodeConfig, NodeMode, SettingsError};
use onionmesh_transport::{Libp2pTransport, Transport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Core(#[from] OnionMeshError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Keystore(#[from] onionmesh_keystore::KeystoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("listen address is not a valid multiaddr: {0}")]
    InvalidListenAddr(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// A running node: transport handle plus the config it was built from.
/// `run` drives the relay accept loop and, in client-capable modes, the
/// SOCKS5 frontend, until one of the spawned tasks exits.
pub struct Node {
    config: NodeConfig,
    transport: Arc<Libp2pTransport>,
    relay_config: RelayConfig,
    self_id: PeerId,
    map: onionmesh_core::NetworkMap,
}

impl Node {
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let identity_path = std::path::Path::new(&config.identity_path);
        let identity = onionmesh_keystore::load_or_generate(identity_path)?;
        let self_id = identity.peer_id();

        let map = load_network_map(std::path::Path::new(&config.network_map_path))?;

        let listen_addr: Multiaddr = config
            .listen_addr
            .parse()
            .map_err(|_| DaemonError::InvalidListenAddr(config.listen_addr.clone()))?;
        let transport = Arc::new(Libp2pTransport::bind(listen_addr, PROXY_RELAY_PROTOCOL).await?);

        for (peer, member) in map.iter() {
            if *peer == self_id {
                continue;
            }
            if let Ok(addr) = member.address.parse::<Multiaddr>() {
                transport.register_peer(peer.clone(), addr).await;
            }
        }

        let allowlist = if config.mode == NodeMode::Full {
            ExitAllowlist::new(config.allowed_exit_ports.clone())
        } else {
            ExitAllowlist::disabled()
        };

        let relay_config = RelayConfig {
            onion_secret: identity.onion.secret.clone(),
            allowlist,
            replay_cache: Arc::new(ReplayCache::default()),
            transport: transport.clone(),
        };

        tracing::info!(peer_id = %self_id, mode = ?config.mode, "node identity ready");

        Ok(Self {
            config,
            transport,
            relay_config,
            self_id,
            map,
        })
    }

    /// Runs until the process receives a shutdown signal. Spawns the relay
    /// accept loop only in `Relay`/`Full` mode, and the SOCKS5 frontend
    /// only in `Client`/`Full` mode.
    pub async fn run(self) -> Result<()> {
        let relay_transport = self.transport.clone();
        let relay_config = Arc::new(self.relay_config);
        let accept_loop = if matches!(self.config.mode, NodeMode::Relay | NodeMode::Full) {
            let relay_config = relay_config.clone();
            Some(tokio::spawn(async move {
                loop {
                    match relay_transport.accept(PROXY_RELAY_PROTOCOL).await {
                        Ok((peer, stream)) => {
                            let relay_config = relay_config.clone();
                            tokio::spawn(async move {
                                tracing::debug!(%peer, "accepted relay connection");
                                serve_connection(stream, &relay_config).await;
                            });
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "transport accept failed, stopping relay loop");
                            break;
                        }
                    }
                }
            }))
        } else {
            None
        };

        let socks5_task = if matches!(self.config.mode, NodeMode::Client | NodeMode::Full) {
            let frontend = Arc::new(Socks5Frontend {
                map: self.map,
                self_id: self.self_id,
                num_hops: self.config.default_hops as usize,
                transport: relay_config.transport.clone(),
            });
            let listen_addr = self.config.socks5_listen_addr.clone();
            Some(tokio::spawn(
                async move { frontend.serve(&listen_addr).await },
            ))
        } else {
            None
        };

        tokio::select! {
            _ = async {
                if let Some(task) = accept_loop {
                    let _ = task.await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {}
            _ = async {
                if let Some(task) = socks5_task {
                    let _ = task.await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }

        Ok(())
    }
}
