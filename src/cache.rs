//! In-memory TTL cache of wire-format responses.

pub mod proxy;

pub use proxy::CacheProxy;

use crate::message::CacheKey;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A full cache frees `max_size / EVICTION_BATCH_DIVISOR` entries at once
const EVICTION_BATCH_DIVISOR: usize = 10;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub wire: Bytes,
    pub expiry: Instant,
    pub original_ttl: u32,
}

impl CacheEntry {
    pub fn new(wire: Bytes, ttl: u32) -> Self {
        Self {
            wire,
            expiry: Instant::now() + Duration::from_secs(ttl as u64),
            original_ttl: ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expiry
    }

    /// Seconds left before expiry
    pub fn remaining_ttl(&self) -> u32 {
        self.expiry
            .saturating_duration_since(Instant::now())
            .as_secs() as u32
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expired_evictions: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired_eviction(&self) {
        self.expired_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Response cache keyed by `"name/type/class"`.
///
/// Writes go straight into the map, so a value is visible to every reader as soon as
/// [`set`](DnsCache::set) returns. When the cache is full, expired entries are dropped first,
/// then the entries closest to expiry, a batch at a time.
#[derive(Debug)]
pub struct DnsCache {
    entries: DashMap<CacheKey, CacheEntry>,
    max_size: usize,
    stats: CacheStats,
    // serializes eviction passes so concurrent inserts don't evict more than needed
    eviction: Mutex<()>,
}

impl DnsCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_size: max_size.max(1),
            stats: CacheStats::default(),
            eviction: Mutex::new(()),
        }
    }

    /// Get the cached wire message if present and not expired
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        // copy out before touching the map again, a held ref would deadlock remove_if
        let cached = self
            .entries
            .get(key)
            .map(|entry| (entry.is_expired(), entry.wire.clone()));

        match cached {
            Some((false, wire)) => {
                self.stats.record_hit();
                trace!("Cache hit for {}", key);
                Some(wire)
            }
            Some((true, _)) => {
                // only drop it if nobody refreshed it in between
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired())
                    .is_some()
                {
                    self.stats.record_expired_eviction();
                    debug!("Removed expired cache entry for {}", key);
                }
                self.stats.record_miss();
                None
            }
            None => {
                self.stats.record_miss();
                trace!("Cache miss for {}", key);
                None
            }
        }
    }

    /// Store `wire` for `ttl` seconds. A zero TTL is not cached.
    pub fn set(&self, key: CacheKey, wire: Bytes, ttl: u32) {
        if ttl == 0 {
            debug!("Not caching {} with 0 TTL", key);
            return;
        }

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict();
        }

        debug!("Cached {} (TTL: {}s)", key, ttl);
        self.entries.insert(key, CacheEntry::new(wire, ttl));
    }

    pub fn remove(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Time left on an entry, if cached
    pub fn ttl(&self, key: &CacheKey) -> Option<u32> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.remaining_ttl())
    }

    /// Make room for at least one insert. Each pass frees a batch of entries so a full cache
    /// scans the map once per batch rather than once per insert.
    fn evict(&self) {
        let _guard = self.eviction.lock();
        if self.entries.len() < self.max_size {
            return;
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let expired = before.saturating_sub(self.entries.len());
        for _ in 0..expired {
            self.stats.record_expired_eviction();
        }

        let target = self.max_size.saturating_sub(self.eviction_batch());
        let len = self.entries.len();
        if len <= target {
            return;
        }

        let excess = len - target;
        let mut by_expiry: Vec<(Instant, CacheKey)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().expiry, entry.key().clone()))
            .collect();
        if excess < by_expiry.len() {
            by_expiry.select_nth_unstable_by_key(excess - 1, |(expiry, _)| *expiry);
            by_expiry.truncate(excess);
        }

        for (_, key) in by_expiry {
            if self.entries.remove(&key).is_some() {
                self.stats.record_eviction();
                trace!("Evicted cache entry for {}", key);
            }
        }
        debug!("Evicted {} cache entries nearest expiry", excess);
    }

    /// Entries freed per eviction pass
    fn eviction_batch(&self) -> usize {
        (self.max_size / EVICTION_BATCH_DIVISOR).max(1)
    }

    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!("Cleared {} cache entries", count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new(10000)
    }
}
