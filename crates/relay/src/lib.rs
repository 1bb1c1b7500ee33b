//! Relay state machine (§4.4).
//!
//! `AwaitHeader -> Processing -> {Forwarding, Terminating, Failed}`. Any
//! failure resets the inbound stream rather than returning a differentiated
//! error, so a probing peer can't distinguish "bad MAC" from "port
//! forbidden" from "dial failed".

mod allowlist;
mod replay;

pub use allowlist::ExitAllowlist;
pub use replay::ReplayCache;

use onionmesh_core::{OnionMeshError, PeerId, PROXY_RELAY_PROTOCOL};
use onionmesh_crypto::{process_onion_packet, HandshakePayload, SphinxPacket, SphinxStep};
use onionmesh_framing::FramedStream;
use onionmesh_transport::{BoxedStream, Transport};
use p256::SecretKey;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Core(#[from] OnionMeshError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Maximum allowed clock skew between an exit request's timestamp and
/// this node's clock, per §9 replay-protection design notes.
pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 5 * 60;

/// Shared state every relay connection handler reads from; built once at
/// startup from this node's identity, settings, and transport.
pub struct RelayConfig {
    pub onion_secret: SecretKey,
    pub allowlist: ExitAllowlist,
    pub replay_cache: Arc<ReplayCache>,
    pub transport: Arc<dyn Transport>,
}

/// Reads one length-prefixed Sphinx packet from `stream` and processes it:
/// forwards to the next hop, or (if this node is the addressed exit)
/// dials the requested local port and bridges the tunnel.
///
/// Any failure resets the stream (closes it without a response) so a
/// probing peer learns nothing about the cause.
pub async fn serve_connection(stream: BoxedStream, config: &RelayConfig) {
    if let Err(err) = handle_connection(stream, config).await {
        tracing::debug!(error = %err, "relay connection failed, resetting");
    }
}

async fn handle_connection(
    mut stream: BoxedStream,
    config: &RelayConfig,
) -> std::result::Result<(), RelayError> {
    let packet = match read_packet(&mut stream).await {
        Ok(packet) => packet,
        Err(err) => {
            stream.reset();
            return Err(err);
        }
    };

    if !config.replay_cache.check_and_insert(packet.mac).await {
        stream.reset();
        return Err(RelayError::Core(OnionMeshError::AuthFailed));
    }

    let step = match process_onion_packet(&config.onion_secret, &packet) {
        Ok(step) => step,
        Err(err) => {
            stream.reset();
            return Err(err.into());
        }
    };

    match step {
        SphinxStep::Forward { next_addr, packet } => forward(stream, &next_addr, packet, config).await,
        SphinxStep::Terminal { payload } => terminate(stream, payload, config).await,
    }
}

async fn read_packet(stream: &mut BoxedStream) -> std::result::Result<SphinxPacket, RelayError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut data = vec![0u8; len];
    stream.read_exact(&mut data).await?;
    Ok(SphinxPacket::from_bytes(&data)?)
}

async fn write_packet(
    stream: &mut BoxedStream,
    packet: &SphinxPacket,
) -> std::result::Result<(), RelayError> {
    let bytes = packet.to_bytes();
    stream
        .write_all(&(bytes.len() as u32).to_be_bytes())
        .await?;
    stream.write_all(&bytes).await?;
    Ok(())
}

/// Start the stream bridge between the incoming and outgoing raw streams
/// once the next hop has accepted the forwarded packet.
async fn forward(
    mut inbound: BoxedStream,
    next_addr: &PeerId,
    packet: SphinxPacket,
    config: &RelayConfig,
) -> std::result::Result<(), RelayError> {
    let mut outbound = match config
        .transport
        .open_stream(next_addr, PROXY_RELAY_PROTOCOL)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            inbound.reset();
            return Err(err.into());
        }
    };

    if let Err(err) = write_packet(&mut outbound, &packet).await {
        inbound.reset();
        outbound.reset();
        return Err(err);
    }

    onionmesh_bridge::bridge(inbound, outbound)
        .await
        .map_err(RelayError::Core)
}

/// Dial the requested local port, confirm with the magic welcome byte over
/// an AEAD-framed tunnel keyed by the handshake's session key, then run
/// the stream bridge between that wrapped stream and the local connection.
async fn terminate(
    mut inbound: BoxedStream,
    payload: [u8; onionmesh_crypto::PAYLOAD_SIZE],
    config: &RelayConfig,
) -> std::result::Result<(), RelayError> {
    let handshake = match HandshakePayload::from_bytes(&payload) {
        Ok(handshake) => handshake,
        Err(err) => {
            inbound.reset();
            return Err(err.into());
        }
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64;
    if (now - handshake.timestamp).abs() > MAX_TIMESTAMP_SKEW_SECS {
        inbound.reset();
        return Err(RelayError::Core(OnionMeshError::HandshakeFailed));
    }

    if !config.allowlist.is_exit_enabled() {
        inbound.reset();
        return Err(RelayError::Core(OnionMeshError::ExitNodeDisabled));
    }

    let port = match u16::try_from(handshake.port) {
        Ok(port) => port,
        Err(_) => {
            inbound.reset();
            return Err(RelayError::Core(OnionMeshError::MalformedPacket));
        }
    };
    if !config.allowlist.is_port_allowed(port) {
        inbound.reset();
        return Err(RelayError::Core(OnionMeshError::PortForbidden(port)));
    }

    let local = match TcpStream::connect(("127.0.0.1", port)).await {
        Ok(local) => local,
        Err(err) => {
            inbound.reset();
            return Err(RelayError::Core(OnionMeshError::DialFailed(err.to_string())));
        }
    };

    let mut tunnel = FramedStream::new(inbound, &handshake.session_key);
    tunnel
        .write_all(&[onionmesh_core::MAGIC_WELCOME_BYTE])
        .await?;

    onionmesh_bridge::bridge(tunnel, local)
        .await
        .map_err(RelayError::Core)
}
