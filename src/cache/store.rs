//! Cache Store Module
//!
//! Main cache engine combining a concurrent point index with a skip-list
//! expiry index maintained by a background task.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc::Permit;
use tokio::sync::Mutex;
use tracing::info;

use crate::cache::{
    CacheEntry, CacheItem, CacheStats, IndexCommand, IndexHandle, SkipList, StatsCounters,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{
    spawn_clock_task, spawn_index_task, spawn_recycle_task, BackgroundTasks, Clock, FaultHandler,
};

// == Cache Core ==
/// State shared between the cache handles and the recycle task.
pub(crate) struct CacheCore<V> {
    /// Effective configuration
    config: CacheConfig,
    /// Byte total at which eviction starts
    recycle_bytes_threshold: i64,
    /// Point index, the source of truth
    entries: DashMap<String, CacheEntry<V>>,
    /// Serialises read-previous / write / account / enqueue sequences
    write_lock: Mutex<()>,
    /// Aggregates and counters
    stats: StatsCounters,
    /// Producer side of the expiry index queue
    index: IndexHandle,
    /// Coarse current time
    clock: Clock,
}

impl<V: CacheItem> CacheCore<V> {
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn recycle_bytes_threshold(&self) -> i64 {
        self.recycle_bytes_threshold
    }

    pub fn stats(&self) -> &StatsCounters {
        &self.stats
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn items(&self) -> i64 {
        self.stats.items()
    }

    pub fn bytes(&self) -> i64 {
        self.stats.bytes()
    }

    // == Get ==
    /// Looks a key up without ever touching the expiry index.
    pub fn get(&self, key: &str) -> Option<(Arc<V>, i64)> {
        let now = self.clock.now();
        let hit = self.entries.get(key).and_then(|entry| {
            entry
                .ttl_remaining(now)
                .map(|ttl| (Arc::clone(&entry.value), ttl))
        });

        match hit {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        hit
    }

    // == Store ==
    /// Writes `value` under `key`.
    ///
    /// A `ttl` of zero keeps the current expiration and creates nothing when
    /// the key is absent. Returns whether an entry was written.
    ///
    /// The queue slot is reserved before any state changes, so a caller
    /// dropped while waiting on backpressure leaves both indices untouched.
    pub async fn store(&self, key: String, value: Arc<V>, ttl: i64) -> Result<bool> {
        if ttl < 0 {
            return Err(CacheError::InvalidArgument(format!(
                "ttl must not be negative, got {}",
                ttl
            )));
        }
        let ttl = ttl.min(self.config.max_ttl_secs);

        let _guard = self.write_lock.lock().await;

        let now = self.clock.now();
        let previous = self
            .entries
            .get(&key)
            .map(|entry| (entry.expire_at, entry.size_bytes));

        let expire_at = match (ttl, previous) {
            (0, None) => return Ok(false),
            (0, Some((previous_expire, _))) => previous_expire,
            (ttl, _) => now.saturating_add(ttl),
        };
        let previous_expire = previous.map(|(expire, _)| expire);

        let permit = if previous_expire != Some(expire_at) {
            Some(self.index.reserve().await?)
        } else {
            None
        };

        let entry = CacheEntry::new(value, expire_at);
        let size = entry.size_bytes;
        self.entries.insert(key.clone(), entry);

        match previous {
            Some((_, previous_size)) => self.stats.record_replace(previous_size, size),
            None => self.stats.record_insert(size),
        }

        if let Some(permit) = permit {
            permit.send(IndexCommand::upsert(key, previous_expire, expire_at));
        }

        Ok(true)
    }

    // == Remove ==
    /// Removes `key` whatever its expiration.
    pub async fn remove(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        let _guard = self.write_lock.lock().await;

        if !self.entries.contains_key(key) {
            return Ok(None);
        }
        let permit = self.index.reserve().await?;

        Ok(self
            .entries
            .remove(key)
            .map(|(key, entry)| self.forget(permit, key, entry)))
    }

    /// Removes `key` only if it is expired as of `now`.
    pub async fn remove_expired(&self, key: &str, now: i64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now));
        if !expired {
            return Ok(false);
        }
        let permit = self.index.reserve().await?;

        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .map(|(key, entry)| self.forget(permit, key, entry))
            .is_some())
    }

    /// Accounts for an entry that just left the point index.
    fn forget(
        &self,
        permit: Permit<'_, IndexCommand>,
        key: String,
        entry: CacheEntry<V>,
    ) -> CacheEntry<V> {
        self.stats.record_remove(entry.size_bytes);
        permit.send(IndexCommand::remove(key, entry.expire_at));
        entry
    }
}

// == Cache ==
/// In-process TTL cache with byte-budget eviction.
///
/// Cloning is cheap and every clone shares the same entries. The background
/// tasks stop once the last clone is dropped.
pub struct Cache<V> {
    core: Arc<CacheCore<V>>,
    tasks: Arc<BackgroundTasks>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.core.config)
            .field("items", &self.core.stats.items())
            .field("bytes", &self.core.stats.bytes())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl<V: CacheItem> Cache<V> {
    // == Constructor ==
    /// Creates a cache and starts its background tasks.
    ///
    /// `None` selects the default configuration. Must be called from within
    /// a tokio runtime.
    pub fn new(config: Option<CacheConfig>) -> Result<Self> {
        Self::with_fault_handler(config, None)
    }

    /// Like [`Cache::new`], reporting recycle-loop panics to `on_fault`.
    pub fn with_fault_handler(
        config: Option<CacheConfig>,
        on_fault: Option<FaultHandler>,
    ) -> Result<Self> {
        Self::start(config, None, on_fault)
    }

    /// Builds a cache driven by a caller-owned clock; no clock task is started.
    #[cfg(test)]
    pub(crate) fn with_clock(config: Option<CacheConfig>, clock: Clock) -> Result<Self> {
        Self::start(config, Some(clock), None)
    }

    #[cfg(test)]
    pub(crate) fn with_clock_and_fault_handler(
        config: Option<CacheConfig>,
        clock: Clock,
        on_fault: FaultHandler,
    ) -> Result<Self> {
        Self::start(config, Some(clock), Some(on_fault))
    }

    fn start(
        config: Option<CacheConfig>,
        clock: Option<Clock>,
        on_fault: Option<FaultHandler>,
    ) -> Result<Self> {
        let config = config.unwrap_or_default().validated()?;
        Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let capacity = usize::try_from(config.mutation_queue_capacity).map_err(|_| {
            CacheError::Config(format!(
                "mutation_queue_capacity out of range: {}",
                config.mutation_queue_capacity
            ))
        })?;
        let (index, rx) = IndexHandle::channel(capacity);

        let mut tasks = BackgroundTasks::new();
        let clock = match clock {
            Some(clock) => clock,
            None => {
                let clock = Clock::new();
                tasks.push(spawn_clock_task(clock.clone()));
                clock
            }
        };

        let core = Arc::new(CacheCore {
            recycle_bytes_threshold: config.recycle_bytes_threshold(),
            config,
            entries: DashMap::new(),
            write_lock: Mutex::new(()),
            stats: StatsCounters::new(),
            index,
            clock,
        });

        tasks.push(spawn_index_task(rx, SkipList::new()));
        tasks.push(spawn_recycle_task(Arc::clone(&core), on_fault));

        info!(
            "Cache started: bytes_limit={}, recycle_threshold={}, max_ttl={}s, default_ttl={}s",
            core.config.cache_bytes_limit,
            core.recycle_bytes_threshold,
            core.config.max_ttl_secs,
            core.config.default_ttl_secs
        );

        Ok(Self {
            core,
            tasks: Arc::new(tasks),
        })
    }

    // == Get ==
    /// Returns the value stored under `key` and its remaining TTL in seconds.
    ///
    /// Absent and expired keys both yield `None`. An expired entry is left
    /// in place for the recycle loop to collect.
    pub fn get(&self, key: &str) -> Option<(Arc<V>, i64)> {
        self.core.get(key)
    }

    // == Set ==
    /// Stores `value` with the configured default TTL.
    pub async fn set(&self, key: impl Into<String>, value: Arc<V>) -> Result<()> {
        self.set_ttl(key, value, self.core.config.default_ttl_secs)
            .await
    }

    /// Stores `value` for `ttl` seconds, clamped to the configured maximum.
    ///
    /// # Errors
    /// `InvalidArgument` if `ttl <= 0`; the cache is left unchanged.
    pub async fn set_ttl(&self, key: impl Into<String>, value: Arc<V>, ttl: i64) -> Result<()> {
        if ttl <= 0 {
            return Err(CacheError::InvalidArgument(format!(
                "ttl must be positive, got {}",
                ttl
            )));
        }
        self.core.store(key.into(), value, ttl).await.map(|_| ())
    }

    // == Keep ==
    /// Replaces the value of an existing key without touching its expiration.
    ///
    /// Returns `false`, creating nothing, if the key is absent.
    pub async fn keep(&self, key: impl Into<String>, value: Arc<V>) -> Result<bool> {
        self.core.store(key.into(), value, 0).await
    }

    // == Delete ==
    /// Removes `key`. Returns whether an entry was present.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.core.remove(key).await.map(|entry| entry.is_some())
    }

    // == Aggregates ==
    /// Number of entries physically present, expired or not.
    pub fn items(&self) -> i64 {
        self.core.items()
    }

    /// Sum of the sizes of the entries physically present.
    pub fn bytes(&self) -> i64 {
        self.core.bytes()
    }

    /// Snapshot of every counter.
    pub fn stats(&self) -> CacheStats {
        self.core.stats.snapshot()
    }

    /// Copy of the effective configuration.
    pub fn config(&self) -> CacheConfig {
        self.core.config.clone()
    }

    /// The cache's notion of the current time, in Unix seconds.
    pub fn unix_time(&self) -> i64 {
        self.core.now()
    }

    /// Byte total at or above which the recycle loop evicts.
    pub fn recycle_bytes_threshold(&self) -> i64 {
        self.core.recycle_bytes_threshold
    }

    /// Number of members in the expiry index once every queued command has
    /// been applied.
    pub async fn indexed(&self) -> Result<usize> {
        self.core.index.len().await
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &CacheCore<V> {
        &self.core
    }
}
