//! Expiry Index Task
//!
//! The single consumer of the expiry index queue and the only owner of the
//! skip list. Commands are applied strictly in arrival order.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::cache::{IndexCommand, SkipList};
use crate::tasks::supervisor::panic_message;

/// Maximum number of commands taken off the queue per wake-up.
const DRAIN_BATCH: usize = 256;

/// Spawns the task that drains `rx` into `list`.
///
/// A command that panics is logged and dropped; the task keeps consuming.
/// The task ends once every producer has been dropped.
pub fn spawn_index_task(mut rx: mpsc::Receiver<IndexCommand>, mut list: SkipList) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Starting expiry index task");

        let mut batch = Vec::with_capacity(DRAIN_BATCH);
        while rx.recv_many(&mut batch, DRAIN_BATCH).await > 0 {
            for command in batch.drain(..) {
                let kind = command.kind();
                let applied = panic::catch_unwind(AssertUnwindSafe(|| command.apply(&mut list)));
                if let Err(payload) = applied {
                    error!(
                        "Expiry index command {} panicked: {}",
                        kind,
                        panic_message(payload)
                    );
                }
            }
        }

        debug!("Expiry index task stopped with {} members", list.len());
    })
}
