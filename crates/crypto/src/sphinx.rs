//! Sphinx-style onion packet layering.
//!
//! Constant-size, per-hop-authenticated layered encryption over P-256 ECDH.
//! Grounded in the vendored `p3lib/sphinx/crypto` primitives this system's
//! reference implementation built on: `GenerateECDHSharedSecret`,
//! `ComputeBlindingFactor`, `ComputeMAC`, `GenerateCipherStream` all map
//! directly onto functions below, translated from raw ECDSA scalar math
//! into the `p256`/`elliptic-curve` crate's typed API.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hmac::{Hmac, Mac};
use onionmesh_core::{OnionMeshError, PeerId, Result};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::ops::Reduce;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Marshalled `PeerId` length.
const ADDR_SIZE: usize = 34;
const MAC_SIZE: usize = 32;
/// One routing-blob slot: the next hop's address plus the MAC it must
/// verify when it receives the forwarded packet.
const SLOT_SIZE: usize = ADDR_SIZE + MAC_SIZE;
/// Inner handshake payload size (§4.6).
pub const PAYLOAD_SIZE: usize = 256;

const TERMINAL_SENTINEL: [u8; ADDR_SIZE] = [0u8; ADDR_SIZE];

const STREAM_TAG: &[u8] = b"onionmesh-sphinx-stream-v1";
const MAC_TAG: &[u8] = b"onionmesh-sphinx-mac-v1";
const PAYLOAD_TAG: &[u8] = b"onionmesh-sphinx-payload-v1";

/// One element of a constructed onion path: the hop's identity and its
/// onion (P-256) public key.
#[derive(Clone)]
pub struct CryptoHop {
    pub peer_id: PeerId,
    pub onion_public: PublicKey,
}

/// Fixed-size onion packet. `routing_blob` is always
/// `num_hops * SLOT_SIZE` bytes for a given deployment's hop count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SphinxPacket {
    /// SEC1-compressed ephemeral P-256 public key, blinded once per hop.
    pub ephemeral_pub: Vec<u8>,
    pub mac: [u8; MAC_SIZE],
    pub routing_blob: Vec<u8>,
    pub encrypted_payload: [u8; PAYLOAD_SIZE],
}

/// Outcome of processing one layer at a relay.
pub enum SphinxStep {
    Forward {
        next_addr: PeerId,
        packet: SphinxPacket,
    },
    Terminal {
        payload: [u8; PAYLOAD_SIZE],
    },
}

impl SphinxPacket {
    /// `ephemeral_pub(33) || mac(32) || blob_len(2 BE) || blob || payload(256)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(33 + MAC_SIZE + 2 + self.routing_blob.len() + PAYLOAD_SIZE);
        out.extend_from_slice(&self.ephemeral_pub);
        out.extend_from_slice(&self.mac);
        out.extend_from_slice(&(self.routing_blob.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.routing_blob);
        out.extend_from_slice(&self.encrypted_payload);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        const EPH_LEN: usize = 33;
        if data.len() < EPH_LEN + MAC_SIZE + 2 {
            return Err(OnionMeshError::MalformedPacket);
        }
        let ephemeral_pub = data[0..EPH_LEN].to_vec();
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&data[EPH_LEN..EPH_LEN + MAC_SIZE]);
        let blob_len_off = EPH_LEN + MAC_SIZE;
        let blob_len = u16::from_be_bytes([data[blob_len_off], data[blob_len_off + 1]]) as usize;
        let blob_start = blob_len_off + 2;
        let blob_end = blob_start + blob_len;
        let payload_end = blob_end + PAYLOAD_SIZE;
        if data.len() < payload_end {
            return Err(OnionMeshError::MalformedPacket);
        }
        let routing_blob = data[blob_start..blob_end].to_vec();
        let mut encrypted_payload = [0u8; PAYLOAD_SIZE];
        encrypted_payload.copy_from_slice(&data[blob_end..payload_end]);
        Ok(SphinxPacket {
            ephemeral_pub,
            mac,
            routing_blob,
            encrypted_payload,
        })
    }
}

fn derive_key(tag: &[u8], shared_secret: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(shared_secret);
    hasher.finalize().into()
}

/// `SHA-256(x)` of the ECDH shared point's affine x-coordinate, matching
/// the reference `GenerateECDHSharedSecret`.
fn ecdh_shared_secret(secret: &NonZeroScalar, public: &PublicKey) -> [u8; 32] {
    let shared = diffie_hellman(secret, public.as_affine());
    Sha256::digest(shared.raw_secret_bytes()).into()
}

/// `SHA-256(alpha || shared_secret)`, reduced into a curve scalar.
fn blinding_factor(alpha_sec1: &[u8], shared_secret: &[u8; 32]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(alpha_sec1);
    hasher.update(shared_secret);
    let digest: [u8; 32] = hasher.finalize().into();
    Scalar::reduce_bytes(FieldBytes::from_slice(&digest))
}

fn keystream_xor(key: &[u8; 32], buf: &mut [u8]) {
    let mut cipher = ChaCha20::new(key.into(), &[0u8; 12].into());
    cipher.apply_keystream(buf);
}

fn compute_mac(key: &[u8; 32], message: &[u8]) -> [u8; MAC_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

fn verify_mac(key: &[u8; 32], message: &[u8], expected: &[u8; MAC_SIZE]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.verify_slice(expected).is_ok()
}

struct HopKeys {
    stream_key: [u8; 32],
    mac_key: [u8; 32],
    payload_key: Option<[u8; 32]>,
}

fn sec1_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Build a multi-hop onion packet.
///
/// `hops` is the ordered path (last element is the destination/exit);
/// `payload` is the 256-byte inner handshake payload already encoded by
/// the caller (§4.6).
pub fn build_onion_packet(hops: &[CryptoHop], payload: [u8; PAYLOAD_SIZE]) -> Result<SphinxPacket> {
    let n = hops.len();
    if n == 0 {
        return Err(OnionMeshError::InsufficientPeers {
            needed: 1,
            available: 0,
        });
    }

    // Forward pass: derive every hop's shared secret and per-hop keys,
    // chaining the blinding scalar so hop i's view of the ephemeral key
    // matches what `process_onion_packet` will recompute independently.
    let mut x = SecretKey::random(&mut OsRng).to_nonzero_scalar();
    let ephemeral_pub = sec1_bytes(&ProjectivePoint::from(
        *PublicKey::from_secret_scalar(&x).as_affine(),
    ));

    let mut alpha_point = ProjectivePoint::from(*PublicKey::from_secret_scalar(&x).as_affine());
    let mut per_hop_keys = Vec::with_capacity(n);

    for (i, hop) in hops.iter().enumerate() {
        let shared_secret = ecdh_shared_secret(&x, &hop.onion_public);
        let stream_key = derive_key(STREAM_TAG, &shared_secret);
        let mac_key = derive_key(MAC_TAG, &shared_secret);
        let payload_key = if i == n - 1 {
            Some(derive_key(PAYLOAD_TAG, &shared_secret))
        } else {
            None
        };
        per_hop_keys.push(HopKeys {
            stream_key,
            mac_key,
            payload_key,
        });

        if i + 1 < n {
            let alpha_sec1 = sec1_bytes(&alpha_point);
            let b = blinding_factor(&alpha_sec1, &shared_secret);
            x = NonZeroScalar::new(*x * b)
                .expect("blinding factor is astronomically unlikely to zero a scalar");
            alpha_point = alpha_point * b;
        }
    }

    // Backward pass: build the routing blob back-to-front, chaining each
    // hop's MAC into the slot the previous hop reveals.
    let blob_len = n * SLOT_SIZE;
    let mut blob = vec![0u8; blob_len];
    let mut next_mac_field = [0u8; MAC_SIZE];

    let encrypted_payload = {
        let payload_key = per_hop_keys
            .last()
            .and_then(|k| k.payload_key)
            .expect("terminal hop always carries a payload key");
        let mut out = payload;
        keystream_xor(&payload_key, &mut out);
        out
    };

    for i in (0..n).rev() {
        let addr_field: [u8; ADDR_SIZE] = if i + 1 < n {
            let bytes = hops[i + 1].peer_id.as_bytes();
            let mut a = TERMINAL_SENTINEL;
            let len = bytes.len().min(ADDR_SIZE);
            a[..len].copy_from_slice(&bytes[..len]);
            a
        } else {
            TERMINAL_SENTINEL
        };

        let mut slot = [0u8; SLOT_SIZE];
        slot[..ADDR_SIZE].copy_from_slice(&addr_field);
        slot[ADDR_SIZE..].copy_from_slice(&next_mac_field);

        let mut new_blob = vec![0u8; blob_len];
        new_blob[..SLOT_SIZE].copy_from_slice(&slot);
        new_blob[SLOT_SIZE..].copy_from_slice(&blob[..blob_len - SLOT_SIZE]);

        keystream_xor(&per_hop_keys[i].stream_key, &mut new_blob);
        blob = new_blob;

        let auth_input = [blob.as_slice(), &encrypted_payload].concat();
        next_mac_field = compute_mac(&per_hop_keys[i].mac_key, &auth_input);
    }

    Ok(SphinxPacket {
        ephemeral_pub,
        mac: next_mac_field,
        routing_blob: blob,
        encrypted_payload,
    })
}

/// Process one Sphinx layer at a relay holding `onion_secret`.
pub fn process_onion_packet(onion_secret: &SecretKey, packet: &SphinxPacket) -> Result<SphinxStep> {
    let alpha = PublicKey::from_sec1_bytes(&packet.ephemeral_pub)
        .map_err(|_| OnionMeshError::MalformedPacket)?;

    let shared_secret = ecdh_shared_secret(&onion_secret.to_nonzero_scalar(), &alpha);
    let mac_key = derive_key(MAC_TAG, &shared_secret);

    let auth_input = [packet.routing_blob.as_slice(), &packet.encrypted_payload].concat();
    if !verify_mac(&mac_key, &auth_input, &packet.mac) {
        return Err(OnionMeshError::AuthFailed);
    }

    let stream_key = derive_key(STREAM_TAG, &shared_secret);
    let blob_len = packet.routing_blob.len();
    let mut extended = vec![0u8; blob_len + SLOT_SIZE];
    extended[..blob_len].copy_from_slice(&packet.routing_blob);
    keystream_xor(&stream_key, &mut extended);

    let addr_field = &extended[0..ADDR_SIZE];
    if addr_field == TERMINAL_SENTINEL {
        let payload_key = derive_key(PAYLOAD_TAG, &shared_secret);
        let mut payload = packet.encrypted_payload;
        keystream_xor(&payload_key, &mut payload);
        return Ok(SphinxStep::Terminal { payload });
    }

    let next_addr = PeerId::from_bytes(addr_field.to_vec());
    let mut next_mac = [0u8; MAC_SIZE];
    next_mac.copy_from_slice(&extended[ADDR_SIZE..SLOT_SIZE]);
    let new_blob = extended[SLOT_SIZE..SLOT_SIZE + blob_len].to_vec();

    let alpha_sec1 = packet.ephemeral_pub.clone();
    let b = blinding_factor(&alpha_sec1, &shared_secret);
    let blinded_point = ProjectivePoint::from(*alpha.as_affine()) * b;
    let blinded_pub = PublicKey::from_affine(blinded_point.to_affine())
        .map_err(|_| OnionMeshError::MalformedPacket)?;

    Ok(SphinxStep::Forward {
        next_addr,
        packet: SphinxPacket {
            ephemeral_pub: sec1_bytes(&ProjectivePoint::from(*blinded_pub.as_affine())),
            mac: next_mac,
            routing_blob: new_blob,
            encrypted_payload: packet.encrypted_payload,
        },
    })
}
