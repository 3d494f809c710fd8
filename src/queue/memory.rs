use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::metrics::{keys, Metrics};

use super::job::{epoch_millis, Job};
use super::JobQueue;

/// In-process queue backend: a stable-sorted list plus a dead-letter
/// list, guarded by one mutex so dequeue/requeue stay atomic across
/// worker tasks.
pub struct MemoryQueue {
    metrics: Arc<Metrics>,
    max_retries: u32,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    items: Vec<Job>,
    dead_letter: Vec<Job>,
}

/// Priority weight descending, then insertion time ascending. The sort
/// is stable, so jobs stamped within the same millisecond keep their
/// insertion order.
fn compare(a: &Job, b: &Job) -> Ordering {
    b.priority
        .weight()
        .cmp(&a.priority.weight())
        .then(a.inserted_at.cmp(&b.inserted_at))
}

impl MemoryQueue {
    pub fn new(metrics: Arc<Metrics>, max_retries: u32) -> Self {
        Self {
            metrics,
            max_retries,
            inner: Mutex::new(Inner::default()),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, mut job: Job) -> Result<Job> {
        job.inserted_at = epoch_millis();
        {
            let mut inner = self.inner.lock();
            inner.items.push(job.clone());
            inner.items.sort_by(compare);
        }
        self.metrics.increment(keys::JOB_RECEIVED);
        Ok(job)
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() {
            return Ok(None);
        }
        Ok(Some(inner.items.remove(0)))
    }

    async fn requeue(&self, mut job: Job) -> Result<Option<Job>> {
        job.attempts += 1;
        job.inserted_at = epoch_millis();

        if job.attempts > self.max_retries {
            self.inner.lock().dead_letter.push(job);
            self.metrics.increment(keys::JOB_DEAD_LETTER);
            return Ok(None);
        }

        {
            let mut inner = self.inner.lock();
            inner.items.push(job.clone());
            inner.items.sort_by(compare);
        }
        self.metrics.increment(keys::JOB_RETRIED);
        Ok(Some(job))
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.inner.lock().items.len())
    }

    async fn dead_letter_size(&self) -> Result<usize> {
        Ok(self.inner.lock().dead_letter.len())
    }
}
