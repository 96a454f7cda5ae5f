//! Cluster health aggregation
//!
//! Centralizes the health-score computation so every mutating call site
//! shares one formula and the persisted score is never more than one
//! mutation stale. Recomputation is idempotent and emits no events; event
//! emission belongs to the caller that changed state.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::HealthConfig;
use crate::election::coordination_report;
use crate::error::CorralResult;
use crate::store::ClusterStore;
use crate::types::{ClusterId, ClusterNode, ClusterStatus, NodeHealth};

pub struct HealthAggregator {
    store: Arc<ClusterStore>,
    config: HealthConfig,
}

impl HealthAggregator {
    pub fn new(store: Arc<ClusterStore>, config: HealthConfig) -> Self {
        Self { store, config }
    }

    /// Score a snapshot of a cluster's nodes.
    ///
    /// `online_weight * online_fraction + healthy_weight * healthy_fraction`
    /// where `healthy_fraction` is taken over online nodes only, minus a
    /// penalty for each missing online primary/coordinator, clamped to
    /// [0, 1]. A cluster with no nodes scores 0.0.
    pub fn score_nodes(&self, nodes: &[ClusterNode]) -> f64 {
        if nodes.is_empty() {
            return 0.0;
        }

        let total = nodes.len() as f64;
        let online: Vec<&ClusterNode> = nodes.iter().filter(|n| n.is_online()).collect();
        let online_fraction = online.len() as f64 / total;

        let healthy_fraction = if online.is_empty() {
            0.0
        } else {
            let healthy = online
                .iter()
                .filter(|n| n.health == NodeHealth::Healthy)
                .count() as f64;
            healthy / online.len() as f64
        };

        let mut score = self.config.online_weight * online_fraction
            + self.config.healthy_weight * healthy_fraction;

        let coordination = coordination_report(nodes);
        if !coordination.has_primary {
            score -= self.config.missing_primary_penalty;
        }
        if !coordination.has_coordinator {
            score -= self.config.missing_coordinator_penalty;
        }

        score.clamp(0.0, 1.0)
    }

    /// Recompute and persist a cluster's health score.
    ///
    /// Takes the cluster's coordination lock so the node snapshot is settled
    /// with respect to elections and status transitions, writes the score and
    /// `last_health_check`, and applies the score-driven lifecycle
    /// transitions (`Initializing -> Active` on the first online node,
    /// `Active <-> Degraded` at the configured threshold).
    pub async fn recompute_cluster_health(&self, cluster_id: ClusterId) -> CorralResult<f64> {
        let lock = self.store.coordination_lock(cluster_id);
        let _guard = lock.lock().await;
        self.recompute_locked(cluster_id).await
    }

    /// Recompute for callers already holding the cluster's coordination lock.
    pub(crate) async fn recompute_locked(&self, cluster_id: ClusterId) -> CorralResult<f64> {
        let nodes = self.store.nodes_of_cluster(cluster_id);
        let score = self.score_nodes(&nodes);
        let any_online = nodes.iter().any(|n| n.is_online());
        let threshold = self.config.degraded_threshold;

        self.store
            .with_cluster_mut(cluster_id, |cluster| {
                let now = Utc::now();
                cluster.health_score = score;
                cluster.last_health_check = Some(now);
                cluster.updated_at = now;

                let before = cluster.status;
                if cluster.status == ClusterStatus::Initializing && any_online {
                    cluster.status = ClusterStatus::Active;
                    cluster.activated_at = Some(now);
                }
                match cluster.status {
                    ClusterStatus::Active if score < threshold => {
                        cluster.status = ClusterStatus::Degraded;
                    }
                    ClusterStatus::Degraded if score >= threshold => {
                        cluster.status = ClusterStatus::Active;
                    }
                    _ => {}
                }

                if cluster.status != before {
                    info!(
                        cluster_id = %cluster.external_id,
                        from = %before,
                        to = %cluster.status,
                        score,
                        "cluster status changed on health recomputation"
                    );
                }
            })
            .await?;

        debug!(cluster_id = %cluster_id, score, "recomputed cluster health");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        external_id, ClusterId, NodeId, NodeMetrics, NodeNetwork, NodeResources, NodeStatus,
    };

    fn node(status: NodeStatus, health: NodeHealth, primary: bool, coordinator: bool) -> ClusterNode {
        let now = Utc::now();
        ClusterNode {
            id: NodeId::new(),
            external_id: external_id("nd"),
            cluster_id: ClusterId::new(),
            name: "n".to_string(),
            status,
            health,
            region: "us-east".to_string(),
            availability_zone: None,
            network: NodeNetwork::default(),
            capacity: NodeResources::default(),
            usage: NodeResources::zero(),
            roles: vec!["worker".to_string()],
            capabilities: Vec::new(),
            metrics: NodeMetrics::default(),
            is_primary: primary,
            is_coordinator: coordinator,
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

    fn aggregator() -> HealthAggregator {
        HealthAggregator::new(Arc::new(ClusterStore::new()), HealthConfig::default())
    }

    #[test]
    fn empty_cluster_scores_zero() {
        assert_eq!(aggregator().score_nodes(&[]), 0.0);
    }

    #[test]
    fn single_healthy_node_without_roles_scores_point_eight() {
        let nodes = vec![node(NodeStatus::Online, NodeHealth::Healthy, false, false)];
        let score = aggregator().score_nodes(&nodes);
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn roles_remove_the_penalties() {
        let nodes = vec![node(NodeStatus::Online, NodeHealth::Healthy, true, false)];
        let score = aggregator().score_nodes(&nodes);
        assert!((score - 0.9).abs() < 1e-9);

        let nodes = vec![node(NodeStatus::Online, NodeHealth::Healthy, true, true)];
        let score = aggregator().score_nodes(&nodes);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn offline_primary_does_not_count() {
        // The flag is only meaningful on an online node; an offline holder
        // still incurs the missing-primary penalty.
        let nodes = vec![
            node(NodeStatus::Offline, NodeHealth::Critical, true, false),
            node(NodeStatus::Online, NodeHealth::Healthy, false, false),
        ];
        let score = aggregator().score_nodes(&nodes);
        // online 1/2 -> 0.3, healthy 1/1 -> 0.4, both penalties -> -0.2
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn warning_and_critical_nodes_drag_the_score() {
        let nodes = vec![
            node(NodeStatus::Online, NodeHealth::Healthy, true, true),
            node(NodeStatus::Online, NodeHealth::Warning, false, false),
            node(NodeStatus::Online, NodeHealth::Critical, false, false),
        ];
        // online 3/3 -> 0.6, healthy 1/3 -> 0.1333, no penalties
        let score = aggregator().score_nodes(&nodes);
        assert!((score - (0.6 + 0.4 / 3.0)).abs() < 1e-9);
    }
}
