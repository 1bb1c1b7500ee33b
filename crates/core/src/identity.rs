use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identity naming a node in the overlay.
///
/// Marshalled as a short type-tag (`0x12 0x20`, identifying "sha256 of an
/// Ed25519 verifying key") followed by the 32-byte digest — 34 bytes total,
/// the same shape libp2p's `PeerId` uses for identity-derived peers.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(#[serde(with = "hex_bytes")] Vec<u8>);

const PEER_ID_TAG: [u8; 2] = [0x12, 0x20];

impl PeerId {
    /// Derive a peer identity from a node's long-term Ed25519 verifying key.
    pub fn from_signing_public_key(pubkey: &[u8; 32]) -> Self {
        let digest = Sha256::digest(pubkey);
        let mut bytes = Vec::with_capacity(PEER_ID_TAG.len() + digest.len());
        bytes.extend_from_slice(&PEER_ID_TAG);
        bytes.extend_from_slice(&digest);
        PeerId(bytes)
    }

    /// Construct directly from already-marshalled bytes (e.g. loaded from a
    /// network map config file).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        PeerId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// First 4 bytes as hex, safe to log.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(4)])
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
