//! `OnionDial`: build a Sphinx packet for a path, open the stream to the
//! first hop, and hand the caller a live duplex endpoint once the exit
//! node's magic welcome byte confirms the tunnel is up.
//!
//! Grounded in the reference implementation's `onion.go` `OnionDial`: a
//! fresh ephemeral/session key per dial, a `connectStream` bridge goroutine
//! spawned on success, and a `net.Pipe()` endpoint returned to the caller.

use onionmesh_bridge::bridge;
use onionmesh_core::{
    Member, NetworkMap, OnionMeshError, PeerId, Result, MAGIC_WELCOME_BYTE, PROXY_RELAY_PROTOCOL,
};
use onionmesh_crypto::{build_onion_packet, parse_onion_public, CryptoHop, HandshakePayload};
use onionmesh_framing::FramedStream;
use onionmesh_transport::Transport;
use rand::RngCore;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::path::build_path;

/// Dial `dest:port` through the overlay. On success, returns one end of an
/// in-process duplex pipe; bytes written to it are tunnelled to `port` on
/// the exit node, and bytes read from it are the exit node's replies. The
/// other end's bridge to the first-hop stream runs in a spawned task.
pub async fn onion_dial(
    map: &NetworkMap,
    self_id: &PeerId,
    dest: &PeerId,
    port: u16,
    num_hops: usize,
    transport: Arc<dyn Transport>,
) -> Result<DuplexStream> {
    let path = build_path(map, self_id, dest, num_hops)?;

    let mut hops = Vec::with_capacity(path.len());
    for peer_id in &path {
        let member: &Member = map.get(peer_id).ok_or(OnionMeshError::UnknownPeer)?;
        let onion_public = parse_onion_public(&member.onion_public)
            .map_err(|_| OnionMeshError::HandshakeFailed)?;
        hops.push(CryptoHop {
            peer_id: peer_id.clone(),
            onion_public,
        });
    }

    let mut session_key = [0u8; 32];
    let mut stream_id = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut session_key);
    rand::rngs::OsRng.fill_bytes(&mut stream_id);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64;

    let handshake = HandshakePayload {
        timestamp,
        port: u32::from(port),
        session_key,
        stream_id,
    };

    let packet = build_onion_packet(&hops, handshake.to_bytes())?;
    let first_hop = path.first().ok_or(OnionMeshError::InsufficientPeers {
        needed: 1,
        available: 0,
    })?;

    let mut first_stream = transport
        .open_stream(first_hop, PROXY_RELAY_PROTOCOL)
        .await?;

    let bytes = packet.to_bytes();
    first_stream
        .write_all(&(bytes.len() as u32).to_be_bytes())
        .await
        .map_err(OnionMeshError::from)?;
    first_stream
        .write_all(&bytes)
        .await
        .map_err(OnionMeshError::from)?;

    let mut tunnel = FramedStream::new(first_stream, &session_key);

    let mut welcome = [0u8; 1];
    tunnel
        .read_exact(&mut welcome)
        .await
        .map_err(OnionMeshError::from)?;
    if welcome[0] != MAGIC_WELCOME_BYTE {
        return Err(OnionMeshError::HandshakeFailed);
    }

    let (caller_end, inside_end) = duplex(8192);
    tokio::spawn(async move {
        if let Err(err) = bridge(inside_end, tunnel).await {
            tracing::debug!(error = %err, "tunnel bridge ended");
        }
    });

    Ok(caller_end)
}
