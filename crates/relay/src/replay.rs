//! Bounded replay-prevention set: remembers recently seen packet MACs
//! long enough to reject a resend, then evicts them.
//!
//! Grounded in the reference implementation's `RequestCache` shape (a
//! `HashMap` keyed by id, each entry timestamped, with both a TTL sweep
//! and a hard size cap).

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How long a seen-MAC entry is remembered before it ages out.
pub const REPLAY_TTL: Duration = Duration::from_secs(5 * 60);
/// Hard cap so a flood of distinct packets can't grow the cache unbounded.
pub const REPLAY_MAX_ENTRIES: usize = 100_000;

pub struct ReplayCache {
    seen: Mutex<HashMap<[u8; 32], Instant>>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `mac` has not been seen within the TTL window,
    /// and records it. Returns `false` on a replay.
    pub async fn check_and_insert(&self, mac: [u8; 32]) -> bool {
        let mut seen = self.seen.lock().await;
        let now = Instant::now();
        seen.retain(|_, inserted| now.duration_since(*inserted) < REPLAY_TTL);

        if seen.contains_key(&mac) {
            return false;
        }
        if seen.len() >= REPLAY_MAX_ENTRIES {
            // Drop an arbitrary entry rather than reject legitimate traffic
            // outright under load.
            if let Some(oldest_key) = seen.keys().next().copied() {
                seen.remove(&oldest_key);
            }
        }
        seen.insert(mac, now);
        true
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_sighting_accepted_second_rejected() {
        let cache = ReplayCache::new();
        let mac = [1u8; 32];
        assert!(cache.check_and_insert(mac).await);
        assert!(!cache.check_and_insert(mac).await);
    }

    #[tokio::test]
    async fn test_distinct_macs_both_accepted() {
        let cache = ReplayCache::new();
        assert!(cache.check_and_insert([1u8; 32]).await);
        assert!(cache.check_and_insert([2u8; 32]).await);
    }
}
