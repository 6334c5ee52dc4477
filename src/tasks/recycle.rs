//! Recycle Task
//!
//! Background task that periodically removes expired entries and, once the
//! byte total reaches the configured threshold, evicts the entries closest
//! to expiry until it drops back under.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheCore, CacheItem};
use crate::error::Result;
use crate::tasks::supervisor::{supervise, FaultHandler};

/// Cooldown before a panicked recycle loop is restarted.
pub const RECYCLE_RESTART_DELAY: Duration = Duration::from_secs(30);

/// Outcome of one recycle cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecycleReport {
    /// Entries removed because they had expired
    pub expired: usize,
    /// Entries removed to get back under the byte threshold
    pub evicted: usize,
}

impl RecycleReport {
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.evicted == 0
    }
}

/// Spawns the supervised recycle loop for `core`.
///
/// The loop sleeps for the configured interval, runs one cycle, and repeats.
/// A panic inside a cycle is reported to `on_fault` and the loop is
/// restarted after [`RECYCLE_RESTART_DELAY`].
pub(crate) fn spawn_recycle_task<V: CacheItem>(
    core: Arc<CacheCore<V>>,
    on_fault: Option<FaultHandler>,
) -> JoinHandle<()> {
    let interval = core.config().recycle_interval();

    tokio::spawn(supervise(
        "recycle",
        RECYCLE_RESTART_DELAY,
        on_fault,
        move || run_recycle_loop(Arc::clone(&core), interval),
    ))
}

async fn run_recycle_loop<V: CacheItem>(core: Arc<CacheCore<V>>, interval: Duration) {
    info!(
        "Starting recycle task with interval of {} seconds",
        interval.as_secs()
    );

    loop {
        tokio::time::sleep(interval).await;

        match recycle_once(&core).await {
            Ok(report) if report.is_empty() => {
                debug!(
                    "Recycle: nothing to remove, {} index commands pending",
                    core.index().pending()
                );
            }
            Ok(report) => {
                info!(
                    "Recycle: removed {} expired and evicted {} entries, {} bytes remain",
                    report.expired,
                    report.evicted,
                    core.bytes()
                );
            }
            Err(err) => {
                warn!("Recycle cycle aborted: {}", err);
            }
        }
    }
}

// == Recycle Cycle ==
/// Runs one sweep followed by as many eviction batches as needed.
pub(crate) async fn recycle_once<V: CacheItem>(core: &CacheCore<V>) -> Result<RecycleReport> {
    let mut report = RecycleReport::default();

    // Sweep: every member whose expiry is before now
    let now = core.now();
    let candidates = core.index().range_by_score(0, now).await?;
    for key in candidates {
        if core.remove_expired(&key, now).await? {
            report.expired += 1;
        }
    }
    core.stats().record_expired(report.expired as u64);

    // Evict: lowest ranks first, i.e. the soonest to expire
    let threshold = core.recycle_bytes_threshold();
    let batch_size = usize::try_from(core.config().recycle_batch_size).unwrap_or(1).max(1);
    while core.bytes() >= threshold {
        let batch = core.index().range_by_rank(1, batch_size + 1).await?;
        if batch.is_empty() {
            warn!(
                "Expiry index exhausted with {} bytes still at or above threshold {}",
                core.bytes(),
                threshold
            );
            break;
        }

        let mut removed = 0;
        for key in batch {
            if core.remove(&key).await?.is_some() {
                removed += 1;
            }
        }
        if removed == 0 {
            warn!("Eviction batch matched no cached entries, stopping this cycle");
            break;
        }
        report.evicted += removed;
    }
    core.stats().record_evicted(report.evicted as u64);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::CacheConfig;
    use crate::tasks::Clock;

    const START: i64 = 1_700_000_000;

    /// A value whose reported size is fixed.
    struct Blob(usize);

    impl CacheItem for Blob {
        fn cache_bytes(&self) -> usize {
            self.0
        }
    }

    fn config(bytes_limit: i64, ratio: i64, batch: i64) -> CacheConfig {
        CacheConfig {
            cache_bytes_limit: bytes_limit,
            recycle_ratio_threshold: ratio,
            recycle_batch_size: batch,
            // Keep the background loop out of the way
            recycle_check_interval_secs: 3600,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let clock = Clock::starting_at(START);
        let cache = Cache::with_clock(Some(config(1 << 20, 80, 10)), clock.clone()).unwrap();

        cache.set_ttl("short", Arc::new(Blob(10)), 5).await.unwrap();
        cache.set_ttl("long", Arc::new(Blob(10)), 50).await.unwrap();

        // Expiring exactly now is left for the next cycle
        clock.advance(5);
        let report = recycle_once(cache.core()).await.unwrap();
        assert!(report.is_empty());
        assert!(cache.get("short").is_none());

        clock.advance(1);
        let report = recycle_once(cache.core()).await.unwrap();

        assert_eq!(report, RecycleReport { expired: 1, evicted: 0 });
        assert_eq!(cache.items(), 1);
        assert_eq!(cache.bytes(), 10);
        assert!(cache.get("long").is_some());
        assert_eq!(cache.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_sweep_ignores_refreshed_entries() {
        let clock = Clock::starting_at(START);
        let cache = Cache::with_clock(Some(config(1 << 20, 80, 10)), clock.clone()).unwrap();

        cache.set_ttl("k", Arc::new(Blob(1)), 1).await.unwrap();
        clock.advance(2);
        cache.set_ttl("k", Arc::new(Blob(1)), 10).await.unwrap();

        let report = recycle_once(cache.core()).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(cache.items(), 1);
    }

    #[tokio::test]
    async fn test_evicts_soonest_expiring_first() {
        let clock = Clock::starting_at(START);
        // Threshold: 1000 * 50 / 100 = 500 bytes
        let cache = Cache::with_clock(Some(config(1000, 50, 2)), clock).unwrap();

        for (i, key) in ["k1", "k2", "k3", "k4", "k5", "k6"].iter().enumerate() {
            let ttl = 10 * (i as i64 + 1);
            cache.set_ttl(*key, Arc::new(Blob(100)), ttl).await.unwrap();
        }
        assert_eq!(cache.bytes(), 600);

        let report = recycle_once(cache.core()).await.unwrap();

        assert_eq!(report, RecycleReport { expired: 0, evicted: 2 });
        assert_eq!(cache.bytes(), 400);
        assert!(cache.get("k1").is_none());
        assert!(cache.get("k2").is_none());
        for key in ["k3", "k4", "k5", "k6"] {
            assert!(cache.get(key).is_some(), "{} should survive", key);
        }
        assert_eq!(cache.indexed().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_eviction_runs_until_under_threshold() {
        let clock = Clock::starting_at(START);
        // Threshold: 100 bytes, one entry per batch
        let cache = Cache::with_clock(Some(config(100, 100, 1)), clock).unwrap();

        for i in 0..5 {
            cache
                .set_ttl(format!("k{}", i), Arc::new(Blob(40)), 100 - i)
                .await
                .unwrap();
        }

        let report = recycle_once(cache.core()).await.unwrap();

        // 200 bytes -> evict until < 100, i.e. three entries of 40 bytes
        assert_eq!(report.evicted, 3);
        assert_eq!(cache.bytes(), 80);
        // Shortest ttl went first: k4, k3, k2
        assert!(cache.get("k0").is_some());
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k4").is_none());
    }

    /// A value that panics when the cache releases it.
    struct Fragile;

    impl CacheItem for Fragile {
        fn cache_bytes(&self) -> usize {
            1
        }
    }

    impl Drop for Fragile {
        fn drop(&mut self) {
            panic!("fragile value released");
        }
    }

    #[tokio::test]
    async fn test_recycle_panic_reaches_fault_handler() {
        let faults = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let on_fault: FaultHandler = {
            let faults = Arc::clone(&faults);
            Arc::new(move |message: &str| faults.lock().unwrap().push(message.to_string()))
        };

        let clock = Clock::starting_at(START);
        let config = CacheConfig {
            recycle_check_interval_secs: 1,
            ..CacheConfig::default()
        };
        let cache =
            Cache::with_clock_and_fault_handler(Some(config), clock.clone(), on_fault).unwrap();

        cache.set_ttl("k", Arc::new(Fragile), 1).await.unwrap();
        clock.advance(10);

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(
            *faults.lock().unwrap(),
            vec!["fragile value released".to_string()]
        );
        // The entry left both indices before the value was released
        assert_eq!(cache.items(), 0);
        assert_eq!(cache.indexed().await.unwrap(), 0);
    }
}
