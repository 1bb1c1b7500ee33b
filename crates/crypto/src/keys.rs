use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use onionmesh_core::PeerId;
use p256::{PublicKey as P256PublicKey, SecretKey as P256SecretKey};
use rand::rngs::OsRng;

use crate::{CryptoError, Result};

/// Long-term Ed25519 signing key pair. The verifying key's hash is the
/// node's `PeerId`.
#[derive(Clone)]
pub struct SigningKeypair {
    pub signing_key: SigningKey,
}

impl SigningKeypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::from_signing_public_key(&self.public_key_bytes())
    }

    /// Sign arbitrary data with this node's long-term identity key.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing_key.sign(data).to_bytes()
    }
}

/// Verify a signature produced by `SigningKeypair::sign` against a raw
/// Ed25519 public key, without needing the signer's full keypair in hand.
pub fn verify(pubkey: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(pubkey) else {
        return false;
    };
    let signature = Signature::from_bytes(signature);
    verifying_key.verify(data, &signature).is_ok()
}

/// Per-node P-256 key pair. The private half never leaves this node and is
/// used only for ECDH during Sphinx packet processing (§4.3).
#[derive(Clone)]
pub struct OnionKeypair {
    pub secret: P256SecretKey,
}

impl OnionKeypair {
    pub fn generate() -> Self {
        Self {
            secret: P256SecretKey::random(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> P256PublicKey {
        self.secret.public_key()
    }

    /// SEC1 compressed encoding, the form stored in `NetworkMap::Member`.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key().to_sec1_bytes().to_vec()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes().into()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret = P256SecretKey::from_bytes(bytes.into()).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { secret })
    }
}

/// Parse a SEC1-encoded P-256 point, as stored in the network map config.
pub fn parse_onion_public(bytes: &[u8]) -> Result<P256PublicKey> {
    P256PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidKey)
}

/// Combined long-term identity: a signing key pair (names the node) and an
/// onion key pair (does the ECDH work in the Sphinx engine).
#[derive(Clone)]
pub struct Identity {
    pub signing: SigningKeypair,
    pub onion: OnionKeypair,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            signing: SigningKeypair::generate(),
            onion: OnionKeypair::generate(),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.signing.peer_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_keypair_roundtrip() {
        let kp = SigningKeypair::generate();
        let bytes = kp.to_bytes();
        let restored = SigningKeypair::from_bytes(&bytes);
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn test_peer_id_derived_from_signing_key_is_stable() {
        let kp = SigningKeypair::generate();
        assert_eq!(kp.peer_id(), kp.peer_id());
    }

    #[test]
    fn test_onion_keypair_roundtrip() {
        let kp = OnionKeypair::generate();
        let bytes = kp.to_bytes();
        let restored = OnionKeypair::from_bytes(&bytes).unwrap();
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn test_onion_keypair_different_each_generation() {
        let a = OnionKeypair::generate();
        let b = OnionKeypair::generate();
        assert_ne!(a.public_key_bytes(), b.public_key_bytes());
    }

    #[test]
    fn test_parse_onion_public_roundtrip() {
        let kp = OnionKeypair::generate();
        let parsed = parse_onion_public(&kp.public_key_bytes()).unwrap();
        assert_eq!(parsed, kp.public_key());
    }

    #[test]
    fn test_parse_onion_public_rejects_garbage() {
        assert!(parse_onion_public(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_identity_generate() {
        let id = Identity::generate();
        assert_eq!(id.peer_id(), id.signing.peer_id());
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let kp = SigningKeypair::generate();
        let sig = kp.sign(b"relay announcement");
        assert!(verify(&kp.public_key_bytes(), b"relay announcement", &sig));
    }

    #[test]
    fn test_verify_rejects_tampered_data() {
        let kp = SigningKeypair::generate();
        let sig = kp.sign(b"relay announcement");
        assert!(!verify(&kp.public_key_bytes(), b"tampered", &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let kp = SigningKeypair::generate();
        let other = SigningKeypair::generate();
        let sig = kp.sign(b"relay announcement");
        assert!(!verify(
            &other.public_key_bytes(),
            b"relay announcement",
            &sig
        ));
    }
}
