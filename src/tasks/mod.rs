//! Background Tasks Module
//!
//! Contains the tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Clock: refreshes the shared Unix-seconds value once per second
//! - Expiry index: sole owner of the skip list, drains the mutation queue
//! - Recycle: sweeps expired entries and evicts over the byte threshold

mod clock;
mod indexer;
mod recycle;
mod supervisor;

use tokio::task::JoinHandle;

pub use clock::{spawn_clock_task, unix_now, Clock, CLOCK_REFRESH_INTERVAL};
pub use indexer::spawn_index_task;
#[cfg(test)]
pub(crate) use recycle::recycle_once;
pub(crate) use recycle::spawn_recycle_task;
pub use recycle::{RecycleReport, RECYCLE_RESTART_DELAY};
pub use supervisor::{supervise, FaultHandler};

// == Background Tasks ==
/// Handles of the tasks backing one cache; aborts them all when dropped.
#[derive(Debug, Default)]
pub(crate) struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn abort_all(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}
