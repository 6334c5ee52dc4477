//! Configuration Module
//!
//! Handles loading, defaulting and validating cache configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Defaults ==
const DEFAULT_CACHE_BYTES_LIMIT: i64 = 50 * 1024 * 1024;
const DEFAULT_MAX_TTL_SECS: i64 = 7200;
const DEFAULT_DEFAULT_TTL_SECS: i64 = 30;
const DEFAULT_RECYCLE_CHECK_INTERVAL_SECS: i64 = 5;
const DEFAULT_RECYCLE_RATIO_THRESHOLD: i64 = 80;
const DEFAULT_RECYCLE_BATCH_SIZE: i64 = 100;
const DEFAULT_MUTATION_QUEUE_CAPACITY: i64 = 20_000;

/// Largest mutation queue a tokio bounded channel can hold.
pub const MAX_MUTATION_QUEUE_CAPACITY: i64 = (usize::MAX >> 3) as i64;

/// Cache configuration parameters.
///
/// Fields are signed so that out-of-range values supplied by callers can be
/// reported instead of silently wrapping. A zero field means "use the default".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total size budget in bytes
    pub cache_bytes_limit: i64,
    /// Upper bound applied to every requested TTL, in seconds
    pub max_ttl_secs: i64,
    /// TTL used by `Cache::set`, in seconds
    pub default_ttl_secs: i64,
    /// Seconds between two recycle cycles
    pub recycle_check_interval_secs: i64,
    /// Percentage (1-100) of `cache_bytes_limit` at which eviction starts
    pub recycle_ratio_threshold: i64,
    /// Number of entries evicted per batch once over threshold
    pub recycle_batch_size: i64,
    /// Capacity of the queue feeding the expiry index
    pub mutation_queue_capacity: i64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SKIPCACHE_BYTES_LIMIT` - Size budget in bytes (default: 50 MiB)
    /// - `SKIPCACHE_MAX_TTL` - Max TTL in seconds (default: 7200)
    /// - `SKIPCACHE_DEFAULT_TTL` - Default TTL in seconds (default: 30)
    /// - `SKIPCACHE_RECYCLE_INTERVAL` - Recycle period in seconds (default: 5)
    /// - `SKIPCACHE_RECYCLE_RATIO` - Eviction threshold percentage (default: 80)
    /// - `SKIPCACHE_RECYCLE_BATCH` - Eviction batch size (default: 100)
    /// - `SKIPCACHE_QUEUE_CAPACITY` - Expiry index queue capacity (default: 20000)
    ///
    /// Unparseable values fall back to the default; out-of-range values are
    /// kept and rejected later by [`CacheConfig::validated`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_bytes_limit: env_or("SKIPCACHE_BYTES_LIMIT", defaults.cache_bytes_limit),
            max_ttl_secs: env_or("SKIPCACHE_MAX_TTL", defaults.max_ttl_secs),
            default_ttl_secs: env_or("SKIPCACHE_DEFAULT_TTL", defaults.default_ttl_secs),
            recycle_check_interval_secs: env_or(
                "SKIPCACHE_RECYCLE_INTERVAL",
                defaults.recycle_check_interval_secs,
            ),
            recycle_ratio_threshold: env_or(
                "SKIPCACHE_RECYCLE_RATIO",
                defaults.recycle_ratio_threshold,
            ),
            recycle_batch_size: env_or("SKIPCACHE_RECYCLE_BATCH", defaults.recycle_batch_size),
            mutation_queue_capacity: env_or(
                "SKIPCACHE_QUEUE_CAPACITY",
                defaults.mutation_queue_capacity,
            ),
        }
    }

    // == Validation ==
    /// Returns the effective configuration: zero fields replaced by their
    /// defaults, every field checked against its allowed range.
    pub fn validated(&self) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            cache_bytes_limit: or_default(
                "cache_bytes_limit",
                self.cache_bytes_limit,
                defaults.cache_bytes_limit,
            )?,
            max_ttl_secs: or_default("max_ttl_secs", self.max_ttl_secs, defaults.max_ttl_secs)?,
            default_ttl_secs: or_default(
                "default_ttl_secs",
                self.default_ttl_secs,
                defaults.default_ttl_secs,
            )?,
            recycle_check_interval_secs: or_default(
                "recycle_check_interval_secs",
                self.recycle_check_interval_secs,
                defaults.recycle_check_interval_secs,
            )?,
            recycle_ratio_threshold: or_default(
                "recycle_ratio_threshold",
                self.recycle_ratio_threshold,
                defaults.recycle_ratio_threshold,
            )?,
            recycle_batch_size: or_default(
                "recycle_batch_size",
                self.recycle_batch_size,
                defaults.recycle_batch_size,
            )?,
            mutation_queue_capacity: or_default(
                "mutation_queue_capacity",
                self.mutation_queue_capacity,
                defaults.mutation_queue_capacity,
            )?,
        };

        if config.default_ttl_secs > config.max_ttl_secs {
            return Err(CacheError::Config(format!(
                "default_ttl_secs ({}) > max_ttl_secs ({})",
                config.default_ttl_secs, config.max_ttl_secs
            )));
        }

        if config.recycle_ratio_threshold > 100 {
            return Err(CacheError::Config(format!(
                "recycle_ratio_threshold must be within [1, 100], got {}",
                config.recycle_ratio_threshold
            )));
        }

        if config.mutation_queue_capacity > MAX_MUTATION_QUEUE_CAPACITY {
            return Err(CacheError::Config(format!(
                "mutation_queue_capacity must be at most {}, got {}",
                MAX_MUTATION_QUEUE_CAPACITY, config.mutation_queue_capacity
            )));
        }

        if config.recycle_bytes_threshold() < 1 {
            return Err(CacheError::Config(
                "cache_bytes_limit * recycle_ratio_threshold / 100 must be >= 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Byte total at or above which the recycle loop starts evicting.
    pub fn recycle_bytes_threshold(&self) -> i64 {
        self.cache_bytes_limit.saturating_mul(self.recycle_ratio_threshold) / 100
    }

    /// Period between two recycle cycles.
    pub fn recycle_interval(&self) -> Duration {
        Duration::from_secs(self.recycle_check_interval_secs.max(1) as u64)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_bytes_limit: DEFAULT_CACHE_BYTES_LIMIT,
            max_ttl_secs: DEFAULT_MAX_TTL_SECS,
            default_ttl_secs: DEFAULT_DEFAULT_TTL_SECS,
            recycle_check_interval_secs: DEFAULT_RECYCLE_CHECK_INTERVAL_SECS,
            recycle_ratio_threshold: DEFAULT_RECYCLE_RATIO_THRESHOLD,
            recycle_batch_size: DEFAULT_RECYCLE_BATCH_SIZE,
            mutation_queue_capacity: DEFAULT_MUTATION_QUEUE_CAPACITY,
        }
    }
}

fn env_or(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn or_default(field: &str, value: i64, default: i64) -> Result<i64> {
    match value {
        v if v < 0 => Err(CacheError::Config(format!("{} must not be negative, got {}", field, v))),
        0 => Ok(default),
        v => Ok(v),
    }
}
