//! Bounded digest cache with TTL and max-size eviction
//!
//! The ingest worker remembers the signing digests it has already stored so a
//! VAA delivered twice (gossip plus backfill, or two backfills racing) is only
//! verified once. Each entry is ~40 bytes, so 100k entries is about 4 MB.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const DEFAULT_DEDUPE_CACHE_SIZE: usize = 100_000;
pub const DEFAULT_DEDUPE_CACHE_TTL_SECS: u64 = 86_400; // 24 hours

/// Set of 32-byte digests. When full the oldest insertion is evicted; entries
/// older than the TTL count as absent and are purged on insert.
pub struct BoundedHashCache {
    map: HashMap<[u8; 32], Instant>,
    order: VecDeque<[u8; 32]>,
    max_size: usize,
    ttl: Duration,
}

impl BoundedHashCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_size: max_size.max(1),
            ttl,
        }
    }

    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.map.get(hash).is_some_and(|t| t.elapsed() < self.ttl)
    }

    /// Returns false if the digest was already present and fresh
    pub fn insert(&mut self, hash: [u8; 32]) -> bool {
        if self.contains(&hash) {
            return false;
        }

        let now = Instant::now();
        while let Some(front) = self.order.front() {
            let expired = self
                .map
                .get(front)
                .map_or(true, |t| now.duration_since(*t) >= self.ttl);
            if !expired && self.map.len() < self.max_size {
                break;
            }
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }

        // A stale entry for the same digest may still be queued
        if self.map.contains_key(&hash) {
            self.order.retain(|h| *h != hash);
        }
        self.map.insert(hash, now);
        self.order.push_back(hash);
        true
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
