//! Expiry Index Module
//!
//! Commands flowing from the cache to the task that owns the skip list, and
//! the sending half used by the cache and the recycle loop.
//!
//! All commands, queries included, travel through one bounded FIFO channel.
//! A query therefore observes every mutation enqueued before it.

use tokio::sync::{mpsc, oneshot};

use crate::cache::SkipList;
use crate::error::{CacheError, Result};

// == Index Command ==
/// A unit of work for the skip-list owner.
#[derive(Debug)]
pub enum IndexCommand {
    /// Moves `key` to `expire_at`, dropping its `previous` position if any
    Upsert {
        key: String,
        previous: Option<i64>,
        expire_at: i64,
    },
    /// Drops the `(key, expire_at)` pair
    Remove { key: String, expire_at: i64 },
    /// Members with `min <= expire_at < max`
    RangeByScore {
        min: i64,
        max: i64,
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Members whose 1-based rank lies in `[start, end)`
    RangeByRank {
        start: usize,
        end: usize,
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Number of indexed members
    Len { reply: oneshot::Sender<usize> },
}

impl IndexCommand {
    pub fn upsert(key: String, previous: Option<i64>, expire_at: i64) -> Self {
        IndexCommand::Upsert {
            key,
            previous,
            expire_at,
        }
    }

    pub fn remove(key: String, expire_at: i64) -> Self {
        IndexCommand::Remove { key, expire_at }
    }

    /// Applies the command to the skip list.
    ///
    /// Replies are best-effort: a requester that gave up is not an error.
    pub fn apply(self, list: &mut SkipList) {
        match self {
            IndexCommand::Upsert {
                key,
                previous,
                expire_at,
            } => {
                if let Some(previous) = previous {
                    list.remove(&key, previous);
                }
                list.insert(key, expire_at);
            }
            IndexCommand::Remove { key, expire_at } => {
                list.remove(&key, expire_at);
            }
            IndexCommand::RangeByScore { min, max, reply } => {
                let _ = reply.send(list.range_by_score(min, max));
            }
            IndexCommand::RangeByRank { start, end, reply } => {
                let _ = reply.send(list.range_by_rank(start, end));
            }
            IndexCommand::Len { reply } => {
                let _ = reply.send(list.len());
            }
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexCommand::Upsert { .. } => "upsert",
            IndexCommand::Remove { .. } => "remove",
            IndexCommand::RangeByScore { .. } => "range_by_score",
            IndexCommand::RangeByRank { .. } => "range_by_rank",
            IndexCommand::Len { .. } => "len",
        }
    }
}

// == Index Handle ==
/// Producer side of the expiry index queue.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    tx: mpsc::Sender<IndexCommand>,
}

impl IndexHandle {
    /// Creates a handle and the receiver the index task must drain.
    ///
    /// `capacity` must not exceed [`crate::config::MAX_MUTATION_QUEUE_CAPACITY`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<IndexCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Waits for room in the queue. Sending through the permit never waits.
    pub async fn reserve(&self) -> Result<mpsc::Permit<'_, IndexCommand>> {
        self.tx
            .reserve()
            .await
            .map_err(|_| CacheError::IndexUnavailable)
    }

    /// Enqueues a command, waiting for room if the queue is full.
    pub async fn send(&self, command: IndexCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CacheError::IndexUnavailable)
    }

    pub async fn range_by_score(&self, min: i64, max: i64) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(IndexCommand::RangeByScore { min, max, reply }).await?;
        rx.await.map_err(|_| CacheError::IndexUnavailable)
    }

    pub async fn range_by_rank(&self, start: usize, end: usize) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(IndexCommand::RangeByRank { start, end, reply }).await?;
        rx.await.map_err(|_| CacheError::IndexUnavailable)
    }

    pub async fn len(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(IndexCommand::Len { reply }).await?;
        rx.await.map_err(|_| CacheError::IndexUnavailable)
    }

    /// Commands currently waiting in the queue.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
