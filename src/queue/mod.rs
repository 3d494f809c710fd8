//! Priority job queue with a retry/dead-letter lifecycle.
//!
//! Two interchangeable backends implement the [`JobQueue`] contract:
//! [`MemoryQueue`] keeps everything in process, [`RedisQueue`] shares a
//! sorted set between processes. Both order by priority weight
//! (`high > normal > low`) and insertion time within a weight band, and
//! both move a job to a terminal dead-letter store once its attempts
//! exceed the retry budget.

pub mod job;
pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, QueueProvider};
use crate::error::Result;
use crate::metrics::Metrics;

pub use job::{
    epoch_millis, Job, JobPayload, PlaybackEnqueuePayload, PlaylistSyncPayload, Priority,
    VoiceUpdatePayload,
};
pub use memory::MemoryQueue;
pub use redis::RedisQueue;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Stamp and store a job, returning it as stored.
    async fn enqueue(&self, job: Job) -> Result<Job>;

    /// Remove and return the highest-priority, oldest job. Concurrent
    /// callers never observe the same stored job.
    async fn dequeue(&self) -> Result<Option<Job>>;

    /// Hand a failed job back. Returns the re-stored job, or `None`
    /// when the retry budget is exhausted and the job was dead-lettered
    /// (callers must not re-enqueue it).
    async fn requeue(&self, job: Job) -> Result<Option<Job>>;

    async fn size(&self) -> Result<usize>;

    async fn dead_letter_size(&self) -> Result<usize>;

    /// Release any backend connection. No-op for in-process stores.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the queue selected by configuration. The Redis backend
/// connects lazily on first use, so this never touches the network.
pub fn create_queue(config: &Config, metrics: Arc<Metrics>) -> Arc<dyn JobQueue> {
    match config.queue_provider {
        QueueProvider::Memory => Arc::new(MemoryQueue::new(metrics, config.max_job_retries)),
        QueueProvider::Redis => Arc::new(RedisQueue::new(
            metrics,
            config.max_job_retries,
            config.redis_url.clone(),
            config.redis_key_prefix.clone(),
        )),
    }
}
