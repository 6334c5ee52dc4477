//! Coarse Clock
//!
//! A shared "current Unix second" refreshed by a background task, so hot
//! paths read an atomic instead of querying the system time on every call.
//! Readers may observe a value up to one refresh interval old.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// How often the clock task refreshes the shared value.
pub const CLOCK_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

// == Clock ==
/// Cloneable handle on a shared Unix-seconds value.
#[derive(Debug, Clone)]
pub struct Clock {
    now: Arc<AtomicI64>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Creates a clock initialised to the current system time.
    pub fn new() -> Self {
        Self::starting_at(unix_now())
    }

    /// Creates a clock initialised to `unix_secs`.
    pub fn starting_at(unix_secs: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(unix_secs)),
        }
    }

    /// The cached current time in Unix seconds.
    #[inline]
    pub fn now(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }

    /// Re-reads the system time.
    pub fn refresh(&self) {
        self.now.store(unix_now(), Ordering::Relaxed);
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

/// Current system time in Unix seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Spawns the task that refreshes `clock` every [`CLOCK_REFRESH_INTERVAL`].
pub fn spawn_clock_task(clock: Clock) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            "Starting clock task with interval of {} ms",
            CLOCK_REFRESH_INTERVAL.as_millis()
        );

        let mut ticker = tokio::time::interval(CLOCK_REFRESH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            clock.refresh();
        }
    })
}
