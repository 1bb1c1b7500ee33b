//! OnionMesh Crypto
//!
//! Key material (§4.8 identity / onion key pairs), the Sphinx packet
//! engine (§4.3), and the handshake payload codec (§4.6).

mod handshake;
mod keys;
mod sphinx;

pub use handshake::*;
pub use keys::*;
pub use sphinx::*;

use thiserror::Error;

/// Failures specific to key material handling — parsing, generation, or
/// loading a malformed key. Hot-path packet failures use
/// `onionmesh_core::OnionMeshError` instead.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key bytes")]
    InvalidKey,

    #[error("random number generation failed: {0}")]
    Rng(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
