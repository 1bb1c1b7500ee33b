//! Onionmesh Daemon Binary

use onionmesh_daemon::{DaemonError, Node};
use onionmesh_settings::NodeConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,onionmesh=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    init_logging();

    tracing::info!("starting onionmesh daemon");

    let config = NodeConfig::load_or_default()?;
    let node = Node::start(config).await?;
    node.run().await?;

    tracing::info!("daemon stopped");
    Ok(())
}
