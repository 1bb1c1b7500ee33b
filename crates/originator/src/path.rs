//! Path selection: uniform-random relay selection from the static network
//! map, excluding self and the destination, with the destination always
//! last. Grounded in the reference implementation's `GenPath`.

use onionmesh_core::{NetworkMap, OnionMeshError, PeerId, Result, DEFAULT_NUM_HOPS};
use rand::seq::SliceRandom;

/// Build a path of exactly `num_hops` peers ending at `dest`: the final
/// hop is always `dest`, and the preceding `num_hops - 1` hops are chosen
/// uniformly at random from the remaining trusted relays.
pub fn build_path(
    map: &NetworkMap,
    self_id: &PeerId,
    dest: &PeerId,
    num_hops: usize,
) -> Result<Vec<PeerId>> {
    let mut candidates: Vec<PeerId> = map
        .iter()
        .filter(|(id, member)| *id != self_id && *id != dest && member.trusted_relay)
        .map(|(id, _)| id.clone())
        .collect();

    let needed = num_hops.saturating_sub(1);
    if candidates.len() < needed {
        return Err(OnionMeshError::InsufficientPeers {
            needed,
            available: candidates.len(),
        });
    }

    candidates.shuffle(&mut rand::thread_rng());
    let mut path: Vec<PeerId> = candidates.into_iter().take(needed).collect();
    path.push(dest.clone());
    Ok(path)
}

/// Convenience wrapper using the deployment-wide default hop count.
pub fn build_default_path(map: &NetworkMap, self_id: &PeerId, dest: &PeerId) -> Result<Vec<PeerId>> {
    build_path(map, self_id, dest, DEFAULT_NUM_HOPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use onionmesh_core::Member;
    use std::collections::HashMap;

    fn member(trusted: bool) -> Member {
        Member {
            address: "/ip4/127.0.0.1/tcp/1".into(),
            onion_public: vec![2u8; 33],
            trusted_relay: trusted,
        }
    }

    #[test]
    fn test_path_ends_at_destination() {
        let self_id = PeerId::from_signing_public_key(&[1u8; 32]);
        let dest = PeerId::from_signing_public_key(&[2u8; 32]);
        let relay_a = PeerId::from_signing_public_key(&[3u8; 32]);
        let relay_b = PeerId::from_signing_public_key(&[4u8; 32]);

        let mut peers = HashMap::new();
        peers.insert(self_id.clone(), member(true));
        peers.insert(dest.clone(), member(true));
        peers.insert(relay_a.clone(), member(true));
        peers.insert(relay_b.clone(), member(true));
        let map = NetworkMap::new(peers);

        let path = build_path(&map, &self_id, &dest, 3).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.last(), Some(&dest));
        assert!(!path.contains(&self_id));
    }

    #[test]
    fn test_insufficient_relays_reports_shortfall() {
        let self_id = PeerId::from_signing_public_key(&[1u8; 32]);
        let dest = PeerId::from_signing_public_key(&[2u8; 32]);
        let mut peers = HashMap::new();
        peers.insert(self_id.clone(), member(true));
        peers.insert(dest.clone(), member(true));
        let map = NetworkMap::new(peers);

        let err = build_path(&map, &self_id, &dest, 3).unwrap_err();
        assert!(matches!(
            err,
            OnionMeshError::InsufficientPeers {
                needed: 2,
                available: 0
            }
        ));
    }

    #[test]
    fn test_untrusted_relays_excluded() {
        let self_id = PeerId::from_signing_public_key(&[1u8; 32]);
        let dest = PeerId::from_signing_public_key(&[2u8; 32]);
        let untrusted = PeerId::from_signing_public_key(&[3u8; 32]);

        let mut peers = HashMap::new();
        peers.insert(self_id.clone(), member(true));
        peers.insert(dest.clone(), member(true));
        peers.insert(untrusted.clone(), member(false));
        let map = NetworkMap::new(peers);

        let err = build_path(&map, &self_id, &dest, 2).unwrap_err();
        assert!(matches!(err, OnionMeshError::InsufficientPeers { .. }));
    }
}
