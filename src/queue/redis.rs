use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::metrics::{keys, Metrics};

use super::job::{epoch_millis, Job};
use super::JobQueue;

/// Remote queue backend shared between processes: jobs live in a sorted
/// set, dead letters in an append-only list. The connection is
/// established lazily on first use and dropped by [`JobQueue::close`].
pub struct RedisQueue {
    metrics: Arc<Metrics>,
    max_retries: u32,
    redis_url: String,
    queue_key: String,
    dead_letter_key: String,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    pub fn new(
        metrics: Arc<Metrics>,
        max_retries: u32,
        redis_url: String,
        key_prefix: String,
    ) -> Self {
        Self {
            metrics,
            max_retries,
            redis_url,
            queue_key: format!("{key_prefix}:queue"),
            dead_letter_key: format!("{key_prefix}:dlq"),
            conn: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let client = redis::Client::open(self.redis_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Dequeue order is score ascending (ZPOPMIN): the priority band is
    /// inverted so that a lower score means a higher priority, and the
    /// insertion timestamp breaks ties oldest-first, matching the
    /// in-process comparator.
    fn score(job: &Job) -> f64 {
        let band = (4 - job.priority.weight()) as f64;
        band * 1e13 + job.inserted_at as f64
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, mut job: Job) -> Result<Job> {
        let mut conn = self.connection().await?;
        job.inserted_at = epoch_millis();
        let raw = serde_json::to_string(&job)?;
        let _: () = conn.zadd(&self.queue_key, raw, Self::score(&job)).await?;
        self.metrics.increment(keys::JOB_RECEIVED);
        Ok(job)
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        let mut conn = self.connection().await?;
        let rows: Vec<(String, f64)> = conn.zpopmin(&self.queue_key, 1).await?;
        match rows.into_iter().next() {
            Some((raw, _score)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn requeue(&self, mut job: Job) -> Result<Option<Job>> {
        let mut conn = self.connection().await?;
        job.attempts += 1;
        job.inserted_at = epoch_millis();
        let raw = serde_json::to_string(&job)?;

        if job.attempts > self.max_retries {
            let _: () = conn.rpush(&self.dead_letter_key, raw).await?;
            self.metrics.increment(keys::JOB_DEAD_LETTER);
            return Ok(None);
        }

        let _: () = conn.zadd(&self.queue_key, raw, Self::score(&job)).await?;
        self.metrics.increment(keys::JOB_RETRIED);
        Ok(Some(job))
    }

    async fn size(&self) -> Result<usize> {
        let mut conn = self.connection().await?;
        let count: u64 = conn.zcard(&self.queue_key).await?;
        Ok(count as usize)
    }

    async fn dead_letter_size(&self) -> Result<usize> {
        let mut conn = self.connection().await?;
        let count: u64 = conn.llen(&self.dead_letter_key).await?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        *self.conn.lock().await = None;
        Ok(())
    }
}
