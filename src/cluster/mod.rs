//! Cluster partitioning and lifecycle.
//!
//! The manager partitions shards across clusters, pairs each cluster
//! with a node-routing view and a worker pool, and tracks liveness.
//! Shard and node assignment are fixed at start; only `status` and
//! `last_heartbeat` move afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::lavalink::{assign_nodes_to_clusters, NodeRouter};
use crate::queue::epoch_millis;
use crate::worker::{WorkerDeps, WorkerPool, WorkerPoolOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Healthy,
    Stopped,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterStatus::Healthy => write!(f, "healthy"),
            ClusterStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Shard partition for one cluster: shard `s` goes to cluster
/// `s mod cluster_count`, so counts stay within one of each other.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardAssignment {
    pub id: String,
    pub shards: Vec<u32>,
}

pub fn assign_shards(cluster_count: u32, shard_count: u32) -> Vec<ShardAssignment> {
    let mut assignments: Vec<ShardAssignment> = (0..cluster_count)
        .map(|index| ShardAssignment {
            id: format!("cluster-{}", index + 1),
            shards: Vec::new(),
        })
        .collect();

    for shard in 0..shard_count {
        assignments[(shard % cluster_count) as usize].shards.push(shard);
    }

    assignments
}

struct Cluster {
    id: String,
    shards: Vec<u32>,
    node_ids: Vec<String>,
    status: ClusterStatus,
    last_heartbeat: i64,
    pool: WorkerPool,
}

/// Read-only projection of a cluster's public fields for health and
/// metrics reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub id: String,
    pub shards: Vec<u32>,
    pub lavalink_node_ids: Vec<String>,
    pub status: ClusterStatus,
    pub workers: usize,
    pub last_heartbeat: i64,
}

pub struct ClusterManagerOptions {
    pub cluster_count: u32,
    pub workers_per_cluster: u32,
    pub shard_count: u32,
    pub worker_poll_interval: Duration,
    pub deps: WorkerDeps,
}

pub struct ClusterManager {
    options: ClusterManagerOptions,
    clusters: RwLock<Vec<Cluster>>,
}

impl ClusterManager {
    pub fn new(options: ClusterManagerOptions) -> Self {
        Self {
            options,
            clusters: RwLock::new(Vec::new()),
        }
    }

    /// Partition shards, assign nodes, and start one worker pool per
    /// cluster.
    pub async fn start(&self) {
        let assignments =
            assign_shards(self.options.cluster_count, self.options.shard_count);
        let cluster_defs =
            assign_nodes_to_clusters(&assignments, &self.options.deps.lavalink.node_ids());

        let mut clusters = self.clusters.write().await;
        for def in cluster_defs {
            let router = Arc::new(NodeRouter::new(
                def.id.clone(),
                def.shards.clone(),
                def.node_ids.clone(),
            ));

            let pool = WorkerPool::new(WorkerPoolOptions {
                count: self.options.workers_per_cluster,
                cluster_id: def.id.clone(),
                deps: self.options.deps.clone(),
                router,
                poll_interval: self.options.worker_poll_interval,
            });
            pool.start();

            tracing::info!(
                cluster_id = %def.id,
                shards = ?def.shards,
                workers = pool.size(),
                lavalink_node_ids = ?def.node_ids,
                "cluster started"
            );

            clusters.push(Cluster {
                id: def.id,
                shards: def.shards,
                node_ids: def.node_ids,
                status: ClusterStatus::Healthy,
                last_heartbeat: epoch_millis(),
                pool,
            });
        }
    }

    /// Stop every pool. Irreversible for this manager instance.
    pub async fn stop(&self) {
        let mut clusters = self.clusters.write().await;
        for cluster in clusters.iter_mut() {
            cluster.pool.stop().await;
            cluster.status = ClusterStatus::Stopped;
            tracing::info!(cluster_id = %cluster.id, "cluster stopped");
        }
    }

    /// Liveness refresh driven by an external periodic trigger. This is
    /// not a health probe: it refreshes timestamps and re-marks every
    /// non-stopped cluster healthy.
    pub async fn heartbeat(&self) {
        let now = epoch_millis();
        let mut clusters = self.clusters.write().await;
        for cluster in clusters.iter_mut() {
            cluster.last_heartbeat = now;
            if cluster.status != ClusterStatus::Stopped {
                cluster.status = ClusterStatus::Healthy;
            }
        }
    }

    pub async fn snapshot(&self) -> Vec<ClusterSnapshot> {
        self.clusters
            .read()
            .await
            .iter()
            .map(|cluster| ClusterSnapshot {
                id: cluster.id.clone(),
                shards: cluster.shards.clone(),
                lavalink_node_ids: cluster.node_ids.clone(),
                status: cluster.status,
                workers: cluster.pool.size(),
                last_heartbeat: cluster.last_heartbeat,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_distribute_by_modulus() {
        let assignments = assign_shards(3, 8);
        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[0].id, "cluster-1");
        assert_eq!(assignments[0].shards, vec![0, 3, 6]);
        assert_eq!(assignments[1].shards, vec![1, 4, 7]);
        assert_eq!(assignments[2].shards, vec![2, 5]);
    }

    #[test]
    fn single_cluster_owns_every_shard() {
        let assignments = assign_shards(1, 4);
        assert_eq!(assignments[0].shards, vec![0, 1, 2, 3]);
    }

    #[test]
    fn more_clusters_than_shards_leaves_empty_clusters() {
        let assignments = assign_shards(4, 2);
        assert_eq!(assignments[0].shards, vec![0]);
        assert_eq!(assignments[1].shards, vec![1]);
        assert!(assignments[2].shards.is_empty());
        assert!(assignments[3].shards.is_empty());
    }
}
