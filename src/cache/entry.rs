//! Cache Entry Module
//!
//! Defines the value capability the cache relies on and the record stored in
//! the point index for every key.

use std::sync::Arc;

// == Cache Item ==
/// Capability every cached value must provide.
///
/// The cache never inspects or copies a value; the reported size is used
/// only for byte accounting and eviction decisions.
pub trait CacheItem: Send + Sync + 'static {
    /// Approximate size of the value in bytes.
    fn cache_bytes(&self) -> usize;
}

impl CacheItem for String {
    fn cache_bytes(&self) -> usize {
        self.len()
    }
}

impl CacheItem for Vec<u8> {
    fn cache_bytes(&self) -> usize {
        self.len()
    }
}

impl CacheItem for Box<[u8]> {
    fn cache_bytes(&self) -> usize {
        self.len()
    }
}

// == Cache Entry ==
/// A single point-index record.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// Absolute expiration time (Unix seconds)
    pub expire_at: i64,
    /// The stored value, shared with callers
    pub value: Arc<V>,
    /// Size reported by the value when it was stored
    pub size_bytes: i64,
}

impl<V: CacheItem> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry, sampling the value's size once.
    pub fn new(value: Arc<V>, expire_at: i64) -> Self {
        let size_bytes = i64::try_from(value.cache_bytes()).unwrap_or(i64::MAX);
        Self {
            expire_at,
            value,
            size_bytes,
        }
    }
}

impl<V> CacheEntry<V> {
    // == Is Expired ==
    /// An entry is expired once `now` reaches its expiration time.
    #[inline]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_at <= now
    }

    // == Time To Live ==
    /// Remaining seconds before expiry, or `None` if already expired.
    #[inline]
    pub fn ttl_remaining(&self, now: i64) -> Option<i64> {
        (!self.is_expired(now)).then(|| self.expire_at - now)
    }
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            expire_at: self.expire_at,
            value: Arc::clone(&self.value),
            size_bytes: self.size_bytes,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_samples_size() {
        let entry = CacheEntry::new(Arc::new("hello".to_string()), 100);

        assert_eq!(entry.size_bytes, 5);
        assert_eq!(entry.expire_at, 100);
        assert_eq!(entry.value.as_str(), "hello");
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new(Arc::new(vec![0u8; 4]), 110);

        assert_eq!(entry.ttl_remaining(100), Some(10));
        assert_eq!(entry.ttl_remaining(109), Some(1));
        assert_eq!(entry.ttl_remaining(120), None);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(Arc::new(vec![0u8; 4].into_boxed_slice()), 100);

        assert!(!entry.is_expired(99));
        // Expired exactly at the expiration second
        assert!(entry.is_expired(100));
        assert_eq!(entry.ttl_remaining(100), None);
    }

    #[test]
    fn test_clone_shares_value() {
        let entry = CacheEntry::new(Arc::new("v".to_string()), 1);
        let copy = entry.clone();
        assert!(Arc::ptr_eq(&entry.value, &copy.value));
    }
}
