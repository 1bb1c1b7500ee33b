//! SOCKS5 frontend (§4.10): a CONNECT-only, no-auth SOCKS5 server that
//! turns "connect to this domain:port" into an `onion_dial` call. The
//! domain name is the destination peer's hex-encoded `PeerId`; the network
//! map's `address` field is not consulted here since the overlay dial goes
//! through the mesh rather than a direct socket.
//!
//! Grounded in the reference implementation's `proxy.go`, simplified from
//! its virtual-IP resolver to a direct peer-id-as-domain convention.

use onionmesh_core::{NetworkMap, OnionMeshError, PeerId};
use onionmesh_originator::onion_dial;
use onionmesh_transport::Transport;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SOCKS5_VERSION: u8 = 0x05;
const CMD_CONNECT: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const REPLY_SUCCEEDED: u8 = 0x00;
const REPLY_GENERAL_FAILURE: u8 = 0x01;
const REPLY_CMD_NOT_SUPPORTED: u8 = 0x07;

pub struct Socks5Frontend {
    pub map: NetworkMap,
    pub self_id: PeerId,
    pub num_hops: usize,
    pub transport: Arc<dyn Transport>,
}

impl Socks5Frontend {
    pub async fn serve(self: Arc<Self>, listen_addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(listen_addr).await?;
        tracing::info!(addr = %listen_addr, "socks5 frontend listening");
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(err) = this.handle_client(socket).await {
                    tracing::debug!(%peer_addr, error = %err, "socks5 client session ended with error");
                }
            });
        }
    }

    async fn handle_client(&self, mut socket: TcpStream) -> std::io::Result<()> {
        negotiate_no_auth(&mut socket).await?;

        let (dest_peer, port) = match read_connect_request(&mut socket).await {
            Ok(v) => v,
            Err(_) => {
                send_reply(&mut socket, REPLY_CMD_NOT_SUPPORTED).await?;
                return Ok(());
            }
        };

        let tunnel = onion_dial(
            &self.map,
            &self.self_id,
            &dest_peer,
            port,
            self.num_hops,
            self.transport.clone(),
        )
        .await;

        let mut tunnel = match tunnel {
            Ok(t) => t,
            Err(err) => {
                tracing::debug!(error = %err, "onion dial failed");
                send_reply(&mut socket, REPLY_GENERAL_FAILURE).await?;
                return Ok(());
            }
        };

        send_reply(&mut socket, REPLY_SUCCEEDED).await?;
        tokio::io::copy_bidirectional(&mut socket, &mut tunnel).await?;
        Ok(())
    }
}

async fn negotiate_no_auth(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut header = [0u8; 2];
    socket.read_exact(&mut header).await?;
    let nmethods = header[1] as usize;
    let mut methods = vec![0u8; nmethods];
    socket.read_exact(&mut methods).await?;
    socket.write_all(&[SOCKS5_VERSION, 0x00]).await?;
    Ok(())
}

async fn read_connect_request(
    socket: &mut TcpStream,
) -> Result<(PeerId, u16), OnionMeshError> {
    let mut head = [0u8; 4];
    socket
        .read_exact(&mut head)
        .await
        .map_err(OnionMeshError::from)?;

    if head[0] != SOCKS5_VERSION || head[1] != CMD_CONNECT || head[3] != ATYP_DOMAIN {
        return Err(OnionMeshError::MalformedPacket);
    }

    let mut len_buf = [0u8; 1];
    socket
        .read_exact(&mut len_buf)
        .await
        .map_err(OnionMeshError::from)?;
    let mut domain = vec![0u8; len_buf[0] as usize];
    socket
        .read_exact(&mut domain)
        .await
        .map_err(OnionMeshError::from)?;

    let mut port_buf = [0u8; 2];
    socket
        .read_exact(&mut port_buf)
        .await
        .map_err(OnionMeshError::from)?;
    let port = u16::from_be_bytes(port_buf);

    let hex_str = String::from_utf8(domain).map_err(|_| OnionMeshError::MalformedPacket)?;
    let bytes = hex::decode(hex_str.trim()).map_err(|_| OnionMeshError::MalformedPacket)?;
    Ok((PeerId::from_bytes(bytes), port))
}

async fn send_reply(socket: &mut TcpStream, reply: u8) -> std::io::Result<()> {
    // BND.ADDR/BND.PORT are unused by CONNECT-only clients; zero them.
    let response = [SOCKS5_VERSION, reply, 0x00, ATYP_DOMAIN, 0x00, 0x00, 0x00];
    socket.write_all(&response).await
}
