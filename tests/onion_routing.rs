//! Scenario-level integration tests for onion routing, exercised end to
//! end over the mock transport: path selection, Sphinx processing, the
//! relay state machine, and the originator dial all run together.

mod common;

use std::sync::Arc;
use std::time::Duration;

use onionmesh_core::OnionMeshError;
use onionmesh_originator::onion_dial;
use onionmesh_relay::ExitAllowlist;
use onionmesh_transport::{MockNetwork, Transport};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::{build_network_map, spawn_nodes, spawn_relay_loop};

/// Binds a loopback server that accepts one connection, reads whatever the
/// client sends (up to `max_len`), reverses it, writes the reversal back,
/// and returns. Returns the bound port.
async fn spawn_reverse_echo_server(max_len: usize) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; max_len];
        let n = socket.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf.reverse();
        socket.write_all(&buf).await.unwrap();
    });
    port
}

/// Binds a loopback server that echoes every byte it reads straight back,
/// concurrently, until the client closes its side.
async fn spawn_bidirectional_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (mut read_half, mut write_half) = socket.into_split();
        let _ = tokio::io::copy(&mut read_half, &mut write_half).await;
    });
    port
}

/// Binds a loopback server that writes exactly `n` bytes and then closes
/// the connection without reading anything further.
async fn spawn_fixed_write_then_close_server(n: usize) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let payload = vec![0xABu8; n];
        socket.write_all(&payload).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    port
}

#[tokio::test]
async fn scenario_a_round_trip_through_three_hops() {
    let network = MockNetwork::new();
    let nodes = spawn_nodes(&network, 4).await; // A, B, C, D
    let map = build_network_map(&nodes, &[1, 2]); // B, C are relays

    let port = spawn_reverse_echo_server(64).await;
    spawn_relay_loop(&nodes[1], ExitAllowlist::disabled());
    spawn_relay_loop(&nodes[2], ExitAllowlist::disabled());
    spawn_relay_loop(&nodes[3], ExitAllowlist::new(vec![port]));

    let a_transport: Arc<dyn Transport> = nodes[0].transport.clone();
    let mut tunnel = onion_dial(
        &map,
        &nodes[0].peer_id(),
        &nodes[3].peer_id(),
        port,
        3,
        a_transport,
    )
    .await
    .expect("dial should succeed");

    tunnel.write_all(b"ping").await.unwrap();
    let mut response = [0u8; 4];
    tunnel.read_exact(&mut response).await.unwrap();
    assert_eq!(&response, b"gnip");
}

#[tokio::test]
async fn scenario_b_handshake_auth_failure_on_tampered_mac() {
    use onionmesh_core::{PROXY_RELAY_PROTOCOL, MAGIC_WELCOME_BYTE};
    use onionmesh_crypto::{build_onion_packet, parse_onion_public, CryptoHop, HandshakePayload};

    let network = MockNetwork::new();
    let nodes = spawn_nodes(&network, 2).await; // A, B
    let map = build_network_map(&nodes, &[1]);
    spawn_relay_loop(&nodes[1], ExitAllowlist::new(vec![9000]));

    let member = map.get(&nodes[1].peer_id()).unwrap();
    let hop = CryptoHop {
        peer_id: nodes[1].peer_id(),
        onion_public: parse_onion_public(&member.onion_public).unwrap(),
    };
    let handshake = HandshakePayload {
        timestamp: 0,
        port: 9000,
        session_key: [1u8; 32],
        stream_id: [2u8; 16],
    };
    let mut packet = build_onion_packet(&[hop], handshake.to_bytes()).unwrap();
    packet.mac[0] ^= 0xFF;

    let mut stream = nodes[0]
        .transport
        .open_stream(&nodes[1].peer_id(), PROXY_RELAY_PROTOCOL)
        .await
        .unwrap();

    let bytes = packet.to_bytes();
    stream
        .write_all(&(bytes.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&bytes).await.unwrap();

    let mut welcome = [0u8; 1];
    let result = tokio::time::timeout(Duration::from_secs(1), stream.read_exact(&mut welcome)).await;
    match result {
        Ok(Ok(_)) => assert_ne!(welcome[0], MAGIC_WELCOME_BYTE),
        Ok(Err(_)) => {} // relay reset the stream, as expected
        Err(_) => panic!("relay never reset the tampered-MAC connection"),
    }
}

#[tokio::test]
async fn scenario_c_port_not_allowed() {
    let network = MockNetwork::new();
    let nodes = spawn_nodes(&network, 2).await; // A, D
    let map = build_network_map(&nodes, &[]);
    spawn_relay_loop(&nodes[1], ExitAllowlist::new(vec![80]));

    let a_transport: Arc<dyn Transport> = nodes[0].transport.clone();
    let result = onion_dial(
        &map,
        &nodes[0].peer_id(),
        &nodes[1].peer_id(),
        443,
        1,
        a_transport,
    )
    .await;

    assert!(matches!(result, Err(OnionMeshError::HandshakeFailed)));
}

#[tokio::test]
async fn scenario_d_path_too_short() {
    let network = MockNetwork::new();
    let nodes = spawn_nodes(&network, 2).await; // only A and D, no relays
    let map = build_network_map(&nodes, &[]);

    let a_transport: Arc<dyn Transport> = nodes[0].transport.clone();
    let result = onion_dial(
        &map,
        &nodes[0].peer_id(),
        &nodes[1].peer_id(),
        80,
        3,
        a_transport,
    )
    .await;

    assert!(matches!(
        result,
        Err(OnionMeshError::InsufficientPeers { needed: 2, .. })
    ));
}

#[tokio::test]
async fn scenario_e_bidirectional_bulk_transfer() {
    let network = MockNetwork::new();
    let nodes = spawn_nodes(&network, 3).await; // A, B, D
    let map = build_network_map(&nodes, &[1]);

    let port = spawn_bidirectional_echo_server().await;
    spawn_relay_loop(&nodes[1], ExitAllowlist::disabled());
    spawn_relay_loop(&nodes[2], ExitAllowlist::new(vec![port]));

    let a_transport: Arc<dyn Transport> = nodes[0].transport.clone();
    let tunnel = onion_dial(
        &map,
        &nodes[0].peer_id(),
        &nodes[2].peer_id(),
        port,
        2,
        a_transport,
    )
    .await
    .expect("dial should succeed");

    let mut payload = vec![0u8; 1024 * 1024];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut payload);
    let expected_hash = Sha256::digest(&payload);

    let (mut tunnel_read, mut tunnel_write) = tokio::io::split(tunnel);
    let write_payload = payload.clone();
    let writer = tokio::spawn(async move {
        tunnel_write.write_all(&write_payload).await.unwrap();
    });

    let mut received = vec![0u8; payload.len()];
    tunnel_read.read_exact(&mut received).await.unwrap();
    writer.await.unwrap();

    assert_eq!(Sha256::digest(&received), expected_hash);
}

#[tokio::test]
async fn scenario_f_close_propagation() {
    let network = MockNetwork::new();
    let nodes = spawn_nodes(&network, 2).await; // A, D
    let map = build_network_map(&nodes, &[]);

    let port = spawn_fixed_write_then_close_server(1024).await;
    spawn_relay_loop(&nodes[1], ExitAllowlist::new(vec![port]));

    let a_transport: Arc<dyn Transport> = nodes[0].transport.clone();
    let mut tunnel = onion_dial(
        &map,
        &nodes[0].peer_id(),
        &nodes[1].peer_id(),
        port,
        1,
        a_transport,
    )
    .await
    .expect("dial should succeed");

    let mut received = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        let n = tunnel.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received.len(), 1024);

    let write_result = tokio::time::timeout(Duration::from_secs(1), tunnel.write_all(b"late")).await;
    match write_result {
        Ok(Ok(())) => {
            // The duplex write itself may succeed before the closed pipe is
            // noticed; a following flush/read must then observe the close.
            let mut probe = [0u8; 1];
            let n = tunnel.read(&mut probe).await.unwrap_or(0);
            assert_eq!(n, 0);
        }
        Ok(Err(_)) => {} // write failed immediately, as expected
        Err(_) => panic!("write after close neither failed nor timed out"),
    }
}
