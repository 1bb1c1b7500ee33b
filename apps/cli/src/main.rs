//! Onionmesh CLI: generate a node identity, run a node, or manually dial a
//! tunnel for testing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libp2p::Multiaddr;
use onionmesh_core::{PeerId, PROXY_RELAY_PROTOCOL};
use onionmesh_originator::onion_dial;
use onionmesh_settings::NodeConfig;
use onionmesh_transport::Libp2pTransport;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "onionmesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the node config file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a node identity at the configured path, if one doesn't exist.
    Keygen {
        /// Path to write the identity file to.
        path: PathBuf,
    },

    /// Run the node (relay/client/full, per the loaded config).
    Run,

    /// Dial a tunnel to a peer and pipe stdin/stdout through it, for
    /// manual testing of the onion routing path.
    Dial {
        /// Destination peer's hex-encoded identity.
        dest: String,

        /// Local port on the exit node to connect to.
        port: u16,

        /// Number of hops to route through.
        #[arg(short = 'n', long, default_value_t = onionmesh_core::DEFAULT_NUM_HOPS)]
        hops: usize,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,onionmesh=debug"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { path } => keygen(&path),
        Commands::Run => run(cli.config).await,
        Commands::Dial { dest, port, hops } => dial(cli.config, &dest, port, hops).await,
    }
}

fn keygen(path: &PathBuf) -> Result<()> {
    let identity = onionmesh_keystore::load_or_generate(path)
        .context("failed to generate or load identity")?;
    println!("peer id: {}", identity.peer_id());
    println!("identity file: {}", path.display());
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<NodeConfig> {
    let config = match path {
        Some(path) => NodeConfig::load_from(&path).context("failed to load node config")?,
        None => NodeConfig::load_or_default().context("failed to load node config")?,
    };
    Ok(config)
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    info!(mode = ?config.mode, "starting node");
    let node = onionmesh_daemon::Node::start(config).await?;
    node.run().await?;
    Ok(())
}

async fn dial(config_path: Option<PathBuf>, dest_hex: &str, port: u16, hops: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let identity = onionmesh_keystore::load_or_generate(std::path::Path::new(
        &config.identity_path,
    ))?;
    let map = onionmesh_settings::load_network_map(std::path::Path::new(
        &config.network_map_path,
    ))?;

    let listen_addr: Multiaddr = "/ip4/0.0.0.0/tcp/0".parse().expect("valid multiaddr");
    let transport = std::sync::Arc::new(
        Libp2pTransport::bind(listen_addr, PROXY_RELAY_PROTOCOL).await?,
    );
    for (peer, member) in map.iter() {
        if let Ok(addr) = member.address.parse::<Multiaddr>() {
            transport.register_peer(peer.clone(), addr).await;
        }
    }

    let dest_bytes = hex::decode(dest_hex).context("destination is not valid hex")?;
    let dest = PeerId::from_bytes(dest_bytes);

    let tunnel = onion_dial(&map, &identity.peer_id(), &dest, port, hops, transport).await?;
    info!("tunnel established, relaying stdin/stdout");

    let (mut tunnel_read, mut tunnel_write) = tokio::io::split(tunnel);
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    tokio::try_join!(
        tokio::io::copy(&mut stdin, &mut tunnel_write),
        tokio::io::copy(&mut tunnel_read, &mut stdout),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_dial_args() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        let matches =
            cmd.try_get_matches_from(vec!["onionmesh", "dial", "aabbcc", "443", "-n", "2"]);
        assert!(matches.is_ok());
    }

    #[test]
    fn test_keygen_args() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        let matches = cmd.try_get_matches_from(vec!["onionmesh", "keygen", "/tmp/id.bin"]);
        assert!(matches.is_ok());
    }

    #[test]
    fn test_run_requires_no_args() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        let matches = cmd.try_get_matches_from(vec!["onionmesh", "run"]);
        assert!(matches.is_ok());
    }
}
