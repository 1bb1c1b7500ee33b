//! Fixed-layout inner handshake payload carried inside the Sphinx packet's
//! 256-byte encrypted payload field (§4.6).

use onionmesh_core::{OnionMeshError, Result};

pub const HANDSHAKE_PAYLOAD_SIZE: usize = 256;

const OFF_TIMESTAMP: usize = 0;
const OFF_PORT: usize = 8;
const OFF_SESSION_KEY: usize = 12;
const OFF_STREAM_ID: usize = 44;
const OFF_END: usize = 60;

/// What the exit hop needs to open a local socket and key the return
/// AEAD-framed stream: a timestamp for replay bounding, a destination
/// port, a fresh session key, and a stream identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    pub timestamp: i64,
    pub port: u32,
    pub session_key: [u8; 32],
    pub stream_id: [u8; 16],
}

impl HandshakePayload {
    /// `timestamp(8 BE) || port(4 BE) || session_key(32) || stream_id(16)`,
    /// zero-padded to the full 256-byte inner payload. Trailing bytes are
    /// unused padding and may be anything on decode.
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_PAYLOAD_SIZE] {
        let mut out = [0u8; HANDSHAKE_PAYLOAD_SIZE];
        out[OFF_TIMESTAMP..OFF_PORT].copy_from_slice(&self.timestamp.to_be_bytes());
        out[OFF_PORT..OFF_SESSION_KEY].copy_from_slice(&self.port.to_be_bytes());
        out[OFF_SESSION_KEY..OFF_STREAM_ID].copy_from_slice(&self.session_key);
        out[OFF_STREAM_ID..OFF_END].copy_from_slice(&self.stream_id);
        out
    }

    pub fn from_bytes(data: &[u8; HANDSHAKE_PAYLOAD_SIZE]) -> Result<Self> {
        if data.len() < OFF_END {
            return Err(OnionMeshError::MalformedPacket);
        }
        let timestamp = i64::from_be_bytes(
            data[OFF_TIMESTAMP..OFF_PORT]
                .try_into()
                .map_err(|_| OnionMeshError::MalformedPacket)?,
        );
        let port = u32::from_be_bytes(
            data[OFF_PORT..OFF_SESSION_KEY]
                .try_into()
                .map_err(|_| OnionMeshError::MalformedPacket)?,
        );
        let mut session_key = [0u8; 32];
        session_key.copy_from_slice(&data[OFF_SESSION_KEY..OFF_STREAM_ID]);
        let mut stream_id = [0u8; 16];
        stream_id.copy_from_slice(&data[OFF_STREAM_ID..OFF_END]);

        Ok(HandshakePayload {
            timestamp,
            port,
            session_key,
            stream_id,
        })
    }
}
