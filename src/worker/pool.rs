use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lavalink::NodeRouter;

use super::{Worker, WorkerDeps};

pub struct WorkerPoolOptions {
    pub count: u32,
    pub cluster_id: String,
    pub deps: WorkerDeps,
    pub router: Arc<NodeRouter>,
    pub poll_interval: Duration,
}

/// A fixed set of workers serving one cluster. All workers share the
/// cluster's queue, coordinator, router, and backend client; start and
/// stop fan out to every worker.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(options: WorkerPoolOptions) -> Self {
        let workers = (0..options.count)
            .map(|index| {
                Arc::new(Worker::new(
                    format!("{}-worker-{}", options.cluster_id, index + 1),
                    options.cluster_id.clone(),
                    options.deps.clone(),
                    options.router.clone(),
                    options.poll_interval,
                ))
            })
            .collect();

        Self {
            workers,
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one poll-loop task per worker. Idempotent: a started pool
    /// stays started.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }
        for worker in &self.workers {
            let worker = worker.clone();
            let cancel = self.cancel.child_token();
            handles.push(tokio::spawn(worker.run(cancel)));
        }
    }

    /// Signal every worker to stop after its current tick and wait for
    /// the loops to drain. A stopped pool cannot be restarted.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock();
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}
