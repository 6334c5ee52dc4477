//! skipcache demo - exercises the cache under concurrent load
//!
//! Fills a cache with fixed-size records, then runs writer, reader and
//! deleter tasks side by side for a while and reports the statistics.
//!
//! # Environment Variables
//! - `SKIPCACHE_*` - cache configuration, see `CacheConfig::from_env`
//! - `DEMO_KEYS` - number of records loaded up front (default: 100000)
//! - `DEMO_WORKERS` - concurrent workers per role (default: 64)
//! - `DEMO_SECONDS` - duration of the concurrent phase (default: 10)

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skipcache::{Cache, CacheConfig, CacheError, CacheItem};

/// Record stored by the demo.
#[derive(Debug)]
struct Person {
    name: String,
    age: u32,
    location: String,
}

impl CacheItem for Person {
    fn cache_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.name.len() + self.location.len()
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skipcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: bytes_limit={}, max_ttl={}s, default_ttl={}s, recycle_interval={}s",
        config.cache_bytes_limit,
        config.max_ttl_secs,
        config.default_ttl_secs,
        config.recycle_check_interval_secs
    );

    let keys = env_usize("DEMO_KEYS", 100_000);
    let workers = env_usize("DEMO_WORKERS", 64);
    let seconds = env_usize("DEMO_SECONDS", 10) as u64;

    let cache: Cache<Person> = Cache::new(Some(config)).context("failed to start cache")?;

    // Load phase
    let jack = Arc::new(Person {
        name: "jack".to_string(),
        age: 12,
        location: "x".to_string(),
    });
    for i in 0..keys {
        cache.set(i.to_string(), Arc::clone(&jack)).await?;
    }
    info!(
        "Loaded {} keys: items={}, bytes={}",
        keys,
        cache.items(),
        cache.bytes()
    );

    if let Some((person, ttl)) = cache.get("0") {
        info!(
            "Key 0 -> {} ({} years, {}), ttl {}s",
            person.name, person.age, person.location, ttl
        );
    }

    // Concurrent phase
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut handles = Vec::with_capacity(workers * 2);
    for worker in 0..workers {
        let writer = cache.clone();
        handles.push(tokio::spawn(async move {
            let mut round = 0u64;
            while Instant::now() < deadline {
                let person = Arc::new(Person {
                    name: format!("tom-{}", round),
                    age: 38,
                    location: "London".to_string(),
                });
                writer.set_ttl(format!("w{}", worker), Arc::clone(&person), 10).await?;
                writer.set_ttl(format!("w{}b", worker), person, 10).await?;
                round += 1;
                tokio::task::yield_now().await;
            }
            Ok::<(), CacheError>(())
        }));

        let reader = cache.clone();
        handles.push(tokio::spawn(async move {
            while Instant::now() < deadline {
                let _ = reader.get(&format!("w{}", worker));
                let _ = reader.get(&format!("w{}b", worker));
                reader.delete(&format!("w{}", worker)).await?;
                reader.delete(&format!("w{}b", worker)).await?;
                tokio::task::yield_now().await;
            }
            Ok::<(), CacheError>(())
        }));
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    while Instant::now() < deadline {
        ticker.tick().await;
        info!("running: items={}, bytes={}", cache.items(), cache.bytes());
    }

    for handle in handles {
        handle.await.context("demo worker panicked")??;
    }

    let stats = cache.stats();
    info!("Final statistics: {}", serde_json::to_string(&stats)?);
    info!("Hit rate: {:.2}%", stats.hit_rate() * 100.0);

    Ok(())
}
