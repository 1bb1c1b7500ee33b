use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::PeerId;

/// One entry in the static peer directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Reachable transport address (multiaddr string, opaque to this crate).
    pub address: String,
    /// SEC1-encoded P-256 onion public key. Kept as raw bytes here so this
    /// crate has no cryptography dependency; `onionmesh-crypto` parses it.
    #[serde(with = "hex_bytes")]
    pub onion_public: Vec<u8>,
    /// Whether this peer is trusted to act as an intermediate relay.
    pub trusted_relay: bool,
}

/// Read-only table of peer identities to directory entries, built once at
/// startup and never mutated afterward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkMap {
    peers: HashMap<PeerId, Member>,
}

impl NetworkMap {
    pub fn new(peers: HashMap<PeerId, Member>) -> Self {
        Self { peers }
    }

    pub fn get(&self, peer: &PeerId) -> Option<&Member> {
        self.peers.get(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &Member)> {
        self.peers.iter()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn member(addr: &str) -> Member {
        Member {
            address: addr.to_string(),
            onion_public: vec![2u8; 33],
            trusted_relay: true,
        }
    }

    #[test]
    fn test_empty_map() {
        let map = NetworkMap::default();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_get_present_and_absent() {
        let mut peers = HashMap::new();
        let id = PeerId::from_signing_public_key(&[1u8; 32]);
        peers.insert(id.clone(), member("/ip4/127.0.0.1/tcp/9000"));
        let map = NetworkMap::new(peers);

        assert!(map.contains(&id));
        assert_eq!(map.get(&id).unwrap().address, "/ip4/127.0.0.1/tcp/9000");

        let other = PeerId::from_signing_public_key(&[2u8; 32]);
        assert!(!map.contains(&other));
        assert!(map.get(&other).is_none());
    }

    #[test]
    fn test_member_serde_roundtrip() {
        let m = member("/ip4/10.0.0.1/tcp/1");
        let json = serde_json::to_string(&m).unwrap();
        let restored: Member = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.address, m.address);
        assert_eq!(restored.onion_public, m.onion_public);
        assert_eq!(restored.trusted_relay, m.trusted_relay);
    }
}
