//! Cache Statistics Module
//!
//! Tracks the entry/byte aggregates the recycle loop works from, plus
//! hit/miss and removal counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Stats Counters ==
/// Live counters owned by one cache instance.
///
/// `items` and `bytes` must only be changed while the cache's write lock is
/// held; they are atomics so that readers never have to take that lock.
#[derive(Debug, Default)]
pub struct StatsCounters {
    items: AtomicI64,
    bytes: AtomicI64,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for a newly created entry.
    pub fn record_insert(&self, size: i64) {
        self.items.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// Accounts for an overwrite: the entry count is unchanged.
    pub fn record_replace(&self, old_size: i64, new_size: i64) {
        self.bytes.fetch_add(new_size - old_size, Ordering::Relaxed);
    }

    /// Accounts for a removed entry.
    pub fn record_remove(&self, size: i64) {
        self.items.fetch_sub(1, Ordering::Relaxed);
        self.bytes.fetch_sub(size, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_evicted(&self, count: u64) {
        self.evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn items(&self) -> i64 {
        self.items.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> i64 {
        self.bytes.load(Ordering::Relaxed)
    }

    // == Snapshot ==
    /// Copies every counter into a serializable snapshot.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            items: self.items(),
            bytes: self.bytes(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            taken_at: Utc::now(),
        }
    }
}

// == Cache Stats ==
/// Point-in-time view of a cache's statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Entries physically present, including expired ones not yet swept
    pub items: i64,
    /// Sum of the reported sizes of those entries
    pub bytes: i64,
    /// Lookups that returned a live value
    pub hits: u64,
    /// Lookups on absent or expired keys
    pub misses: u64,
    /// Entries removed by the expiry sweep
    pub expired: u64,
    /// Entries removed by byte-budget eviction
    pub evicted: u64,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = StatsCounters::new().snapshot();
        assert_eq!(stats.items, 0);
        assert_eq!(stats.bytes, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_insert_replace_remove() {
        let counters = StatsCounters::new();
        counters.record_insert(100);
        counters.record_insert(50);
        assert_eq!(counters.items(), 2);
        assert_eq!(counters.bytes(), 150);

        counters.record_replace(100, 30);
        assert_eq!(counters.items(), 2);
        assert_eq!(counters.bytes(), 80);

        counters.record_remove(30);
        assert_eq!(counters.items(), 1);
        assert_eq!(counters.bytes(), 50);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counters = StatsCounters::new();
        counters.record_hit();
        counters.record_miss();
        assert_eq!(counters.snapshot().hit_rate(), 0.5);
    }

    #[test]
    fn test_removal_counters() {
        let counters = StatsCounters::new();
        counters.record_expired(3);
        counters.record_evicted(2);
        let stats = counters.snapshot();
        assert_eq!(stats.expired, 3);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let counters = StatsCounters::new();
        counters.record_insert(10);
        let json = serde_json::to_value(counters.snapshot()).unwrap();
        assert_eq!(json["items"], 1);
        assert_eq!(json["bytes"], 10);
        assert!(json["taken_at"].is_string());
    }
}
