//! Cache Module
//!
//! Provides the in-process TTL cache: a concurrent point index, a skip-list
//! expiry index, and the engine tying them together.

mod entry;
mod index;
mod skiplist;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{CacheEntry, CacheItem};
pub use index::{IndexCommand, IndexHandle};
pub use skiplist::{Iter, SkipList, MAX_LEVEL};
pub use stats::{CacheStats, StatsCounters};
pub use store::Cache;

pub(crate) use store::CacheCore;
