use thiserror::Error;

/// Error taxonomy shared by the relay state machine, the Sphinx engine, and
/// the originator. Every failure in the hot path maps onto one of these.
#[derive(Error, Debug)]
pub enum OnionMeshError {
    #[error("Sphinx packet failed to deserialize")]
    MalformedPacket,

    #[error("Sphinx MAC or AEAD tag verification failed")]
    AuthFailed,

    #[error("network map has too few peers to build a {needed}-hop path (have {available})")]
    InsufficientPeers { needed: usize, available: usize },

    #[error("destination peer not found in network map")]
    UnknownPeer,

    #[error("handshake failed: magic byte mismatch or connection closed early")]
    HandshakeFailed,

    #[error("port {0} is not in the exit-node allowlist")]
    PortForbidden(u16),

    #[error("dial to next hop or local service failed: {0}")]
    DialFailed(String),

    #[error("transport I/O error: {0}")]
    TransportError(String),

    #[error("terminal packet received but this node has no exit-node role")]
    ExitNodeDisabled,
}

pub type Result<T> = std::result::Result<T, OnionMeshError>;

impl From<std::io::Error> for OnionMeshError {
    fn from(e: std::io::Error) -> Self {
        OnionMeshError::TransportError(e.to_string())
    }
}
