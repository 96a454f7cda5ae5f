//! Shared in-memory state for the coordination core
//!
//! `ClusterStore` is the single container every component works against:
//! cluster records behind an async `RwLock`, node records in a sharded
//! `DashMap` so heartbeat writes for different nodes never contend, and one
//! coordination lock per cluster that serializes elections, status
//! transitions, and health recomputation for that cluster.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{CorralError, CorralResult};
use crate::types::{Cluster, ClusterId, ClusterNode, NodeId};

pub struct ClusterStore {
    clusters: RwLock<HashMap<ClusterId, Cluster>>,
    clusters_by_external: RwLock<HashMap<String, ClusterId>>,
    nodes: DashMap<NodeId, ClusterNode>,
    nodes_by_external: DashMap<String, NodeId>,
    coordination_locks: DashMap<ClusterId, Arc<Mutex<()>>>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self {
            clusters: RwLock::new(HashMap::new()),
            clusters_by_external: RwLock::new(HashMap::new()),
            nodes: DashMap::new(),
            nodes_by_external: DashMap::new(),
            coordination_locks: DashMap::new(),
        }
    }

    /// The per-cluster lock serializing elections, status transitions, and
    /// health recomputation. Held only across the data-mutation step.
    pub fn coordination_lock(&self, cluster_id: ClusterId) -> Arc<Mutex<()>> {
        self.coordination_locks
            .entry(cluster_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Cluster records

    pub async fn insert_cluster(&self, cluster: Cluster) -> CorralResult<()> {
        let mut by_external = self.clusters_by_external.write().await;
        if by_external.contains_key(&cluster.external_id) {
            return Err(CorralError::Conflict {
                message: format!("cluster id '{}' already registered", cluster.external_id),
            });
        }
        by_external.insert(cluster.external_id.clone(), cluster.id);
        self.clusters.write().await.insert(cluster.id, cluster);
        Ok(())
    }

    pub async fn cluster(&self, id: ClusterId) -> CorralResult<Cluster> {
        self.clusters
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CorralError::not_found(format!("Cluster {}", id)))
    }

    pub async fn cluster_id_by_external(&self, external_id: &str) -> CorralResult<ClusterId> {
        self.clusters_by_external
            .read()
            .await
            .get(external_id)
            .copied()
            .ok_or_else(|| CorralError::not_found(format!("Cluster {}", external_id)))
    }

    pub async fn cluster_by_external(&self, external_id: &str) -> CorralResult<Cluster> {
        let id = self.cluster_id_by_external(external_id).await?;
        self.cluster(id).await
    }

    pub async fn list_clusters(&self) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = self.clusters.read().await.values().cloned().collect();
        clusters.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        clusters
    }

    /// Mutate a cluster record in place. The closure must not call back
    /// into the store.
    pub async fn with_cluster_mut<R>(
        &self,
        id: ClusterId,
        f: impl FnOnce(&mut Cluster) -> R,
    ) -> CorralResult<R> {
        let mut clusters = self.clusters.write().await;
        let cluster = clusters
            .get_mut(&id)
            .ok_or_else(|| CorralError::not_found(format!("Cluster {}", id)))?;
        Ok(f(cluster))
    }

    // Node records

    pub fn insert_node(&self, node: ClusterNode) -> CorralResult<()> {
        if self.nodes_by_external.contains_key(&node.external_id) {
            return Err(CorralError::Conflict {
                message: format!("node id '{}' already registered", node.external_id),
            });
        }
        self.nodes_by_external
            .insert(node.external_id.clone(), node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> CorralResult<ClusterNode> {
        self.nodes
            .get(&id)
            .map(|n| n.value().clone())
            .ok_or_else(|| CorralError::not_found(format!("Node {}", id)))
    }

    pub fn node_id_by_external(&self, external_id: &str) -> CorralResult<NodeId> {
        self.nodes_by_external
            .get(external_id)
            .map(|n| *n.value())
            .ok_or_else(|| CorralError::not_found(format!("Node {}", external_id)))
    }

    pub fn node_by_external(&self, external_id: &str) -> CorralResult<ClusterNode> {
        let id = self.node_id_by_external(external_id)?;
        self.node(id)
    }

    /// Snapshot of every node belonging to a cluster. Each entry is cloned
    /// under its own shard lock; callers needing a settled view hold the
    /// cluster's coordination lock around this call.
    pub fn nodes_of_cluster(&self, cluster_id: ClusterId) -> Vec<ClusterNode> {
        self.nodes
            .iter()
            .filter(|entry| entry.cluster_id == cluster_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn node_count(&self, cluster_id: ClusterId) -> usize {
        self.nodes
            .iter()
            .filter(|entry| entry.cluster_id == cluster_id)
            .count()
    }

    /// Mutate a node record in place under its shard lock. The closure must
    /// not call back into the store.
    pub fn with_node_mut<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut ClusterNode) -> R,
    ) -> CorralResult<R> {
        let mut node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| CorralError::not_found(format!("Node {}", id)))?;
        Ok(f(node.value_mut()))
    }
}

impl Default for ClusterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        external_id, ClusterLimits, ClusterStatus, NodeHealth, NodeMetrics, NodeNetwork,
        NodeResources, NodeStatus,
    };
    use chrono::Utc;

    fn test_cluster() -> Cluster {
        let now = Utc::now();
        Cluster {
            id: ClusterId::new(),
            external_id: external_id("cl"),
            name: "edge-1".to_string(),
            description: None,
            region: "us-east".to_string(),
            version: "1.0.0".to_string(),
            status: ClusterStatus::Initializing,
            config: serde_json::json!({}),
            metadata: serde_json::json!({}),
            limits: ClusterLimits::default(),
            tags: Vec::new(),
            labels: HashMap::new(),
            tenant_count: 0,
            health_score: 0.0,
            last_health_check: None,
            created_at: now,
            updated_at: now,
            activated_at: None,
            decommissioned_at: None,
        }
    }

    fn test_node(cluster_id: ClusterId) -> ClusterNode {
        let now = Utc::now();
        ClusterNode {
            id: NodeId::new(),
            external_id: external_id("nd"),
            cluster_id,
            name: "n1".to_string(),
            status: NodeStatus::Provisioning,
            health: NodeHealth::Unknown,
            region: "us-east".to_string(),
            availability_zone: None,
            network: NodeNetwork::default(),
            capacity: NodeResources::default(),
            usage: NodeResources::zero(),
            roles: vec!["worker".to_string()],
            capabilities: Vec::new(),
            metrics: NodeMetrics::default(),
            is_primary: false,
            is_coordinator: false,
            priority: 0,
            last_heartbeat: None,
            last_restart: None,
            uptime_secs: 0,
            token_digest: String::new(),
            config: serde_json::json!({}),
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn cluster_roundtrip_by_both_identifiers() {
        let store = ClusterStore::new();
        let cluster = test_cluster();
        let id = cluster.id;
        let external = cluster.external_id.clone();

        store.insert_cluster(cluster).await.unwrap();
        assert_eq!(store.cluster(id).await.unwrap().name, "edge-1");
        assert_eq!(store.cluster_by_external(&external).await.unwrap().id, id);

        let err = store.cluster_by_external("cl-missing").await.unwrap_err();
        assert!(matches!(err, CorralError::NotFound { .. }));
    }

    #[tokio::test]
    async fn nodes_are_scoped_to_their_cluster() {
        let store = ClusterStore::new();
        let a = test_cluster();
        let b = test_cluster();
        let a_id = a.id;
        let b_id = b.id;
        store.insert_cluster(a).await.unwrap();
        store.insert_cluster(b).await.unwrap();

        store.insert_node(test_node(a_id)).unwrap();
        store.insert_node(test_node(a_id)).unwrap();
        store.insert_node(test_node(b_id)).unwrap();

        assert_eq!(store.nodes_of_cluster(a_id).len(), 2);
        assert_eq!(store.node_count(b_id), 1);
    }

    #[tokio::test]
    async fn node_mutation_is_visible_through_reads() {
        let store = ClusterStore::new();
        let cluster = test_cluster();
        let cluster_id = cluster.id;
        store.insert_cluster(cluster).await.unwrap();

        let node = test_node(cluster_id);
        let node_id = node.id;
        store.insert_node(node).unwrap();

        store
            .with_node_mut(node_id, |n| {
                n.status = NodeStatus::Online;
                n.health = NodeHealth::Healthy;
            })
            .unwrap();

        let node = store.node(node_id).unwrap();
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.health, NodeHealth::Healthy);
    }
}
