use serde::Serialize;

use crate::cluster::ShardAssignment;

/// Stable 31-multiplier string hash on a wrapping u32, so the same
/// guild id always lands on the same node for session affinity.
fn hash_str(input: &str) -> u32 {
    input
        .bytes()
        .fold(0u32, |hash, byte| hash.wrapping_mul(31).wrapping_add(byte as u32))
}

/// Per-cluster node definition: the shard assignment plus the node ids
/// that cluster routes to.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNodes {
    pub id: String,
    pub shards: Vec<u32>,
    pub node_ids: Vec<String>,
}

/// Round robin over the cluster index: cluster `i` gets node
/// `i mod len(nodes)`. With no nodes configured every cluster gets an
/// empty list and backend features are disabled for it.
pub fn assign_nodes_to_clusters(
    assignments: &[ShardAssignment],
    node_ids: &[String],
) -> Vec<ClusterNodes> {
    assignments
        .iter()
        .enumerate()
        .map(|(index, assignment)| ClusterNodes {
            id: assignment.id.clone(),
            shards: assignment.shards.clone(),
            node_ids: if node_ids.is_empty() {
                Vec::new()
            } else {
                vec![node_ids[index % node_ids.len()].clone()]
            },
        })
        .collect()
}

/// One cluster's routing view over its assigned backend nodes.
#[derive(Debug, Clone)]
pub struct NodeRouter {
    cluster_id: String,
    shard_ids: Vec<u32>,
    node_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterSnapshot {
    pub cluster_id: String,
    pub shard_ids: Vec<u32>,
    pub lavalink_node_ids: Vec<String>,
}

impl NodeRouter {
    pub fn new(cluster_id: String, shard_ids: Vec<u32>, node_ids: Vec<String>) -> Self {
        Self {
            cluster_id,
            shard_ids,
            node_ids,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.node_ids.is_empty()
    }

    /// Deterministic preferred-node selection: by shard when given, else
    /// by guild hash, else the first node. `None` when routing is
    /// disabled for this cluster.
    pub fn resolve_preferred_node_id(
        &self,
        guild_id: Option<&str>,
        shard_id: Option<u32>,
    ) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }

        if let Some(shard) = shard_id {
            let index = shard as usize % self.node_ids.len();
            return Some(self.node_ids[index].clone());
        }

        if let Some(guild) = guild_id {
            let index = hash_str(guild) as usize % self.node_ids.len();
            return Some(self.node_ids[index].clone());
        }

        Some(self.node_ids[0].clone())
    }

    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            cluster_id: self.cluster_id.clone(),
            shard_ids: self.shard_ids.clone(),
            lavalink_node_ids: self.node_ids.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::assign_shards;

    fn router(node_ids: &[&str]) -> NodeRouter {
        NodeRouter::new(
            "cluster-1".to_string(),
            vec![0, 3, 6],
            node_ids.iter().map(|id| id.to_string()).collect(),
        )
    }

    #[test]
    fn disabled_router_returns_none() {
        let router = router(&[]);
        assert!(!router.is_enabled());
        assert_eq!(router.resolve_preferred_node_id(Some("g1"), Some(2)), None);
    }

    #[test]
    fn shard_selection_is_deterministic() {
        let router = router(&["alpha", "beta"]);
        assert_eq!(
            router.resolve_preferred_node_id(None, Some(4)),
            Some("alpha".to_string())
        );
        assert_eq!(
            router.resolve_preferred_node_id(None, Some(5)),
            Some("beta".to_string())
        );
        // Shard wins over guild when both are present.
        assert_eq!(
            router.resolve_preferred_node_id(Some("g1"), Some(4)),
            Some("alpha".to_string())
        );
    }

    #[test]
    fn guild_selection_is_stable_across_calls() {
        let router = router(&["alpha", "beta", "gamma"]);
        let first = router.resolve_preferred_node_id(Some("guild-42"), None);
        for _ in 0..10 {
            assert_eq!(router.resolve_preferred_node_id(Some("guild-42"), None), first);
        }
    }

    #[test]
    fn no_hint_falls_back_to_first_node() {
        let router = router(&["alpha", "beta"]);
        assert_eq!(
            router.resolve_preferred_node_id(None, None),
            Some("alpha".to_string())
        );
    }

    #[test]
    fn nodes_assigned_round_robin_by_cluster_index() {
        let assignments = assign_shards(3, 6);
        let node_ids = vec!["alpha".to_string(), "beta".to_string()];
        let clusters = assign_nodes_to_clusters(&assignments, &node_ids);

        assert_eq!(clusters[0].node_ids, vec!["alpha".to_string()]);
        assert_eq!(clusters[1].node_ids, vec!["beta".to_string()]);
        assert_eq!(clusters[2].node_ids, vec!["alpha".to_string()]);
    }

    #[test]
    fn no_nodes_disables_every_cluster() {
        let assignments = assign_shards(2, 4);
        let clusters = assign_nodes_to_clusters(&assignments, &[]);
        assert!(clusters.iter().all(|c| c.node_ids.is_empty()));
    }
}
