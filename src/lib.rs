//! skipcache - An in-process TTL cache
//!
//! Entries live in a concurrent point index; a skip list ordered by
//! expiration time, fed through a single-consumer queue, drives expiry
//! sweeps and byte-budget eviction.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheItem, CacheStats, SkipList};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::FaultHandler;
