//! OnionMesh Core Types
//!
//! Fundamental data structures shared across the overlay: peer identities,
//! the static network map, and the error taxonomy every other crate maps
//! its failures onto.

mod error;
mod identity;
mod network_map;

pub use error::*;
pub use identity::*;
pub use network_map::*;

/// Libp2p-style protocol identifier all relay handshake streams are opened under.
pub const PROXY_RELAY_PROTOCOL: &str = "/pe2pe/0.0.1";

/// Default time budget for dialing the next hop in a chain.
pub const PROXY_RELAY_DIAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// First plaintext byte the exit node sends through the AEAD wrapper once
/// the tunnel is live.
pub const MAGIC_WELCOME_BYTE: u8 = 0x42;

/// Hard-coded production hop count. The reference implementation used 2 for
/// debugging; a production deployment must use at least 3.
pub const DEFAULT_NUM_HOPS: usize = 3;
