//! Primary and coordinator election
//!
//! Enforces the single-holder invariants: within a cluster, at most one
//! online node is primary and at most one is coordinator. Promotions for the
//! same cluster serialize on its coordination lock; concurrent requests
//! resolve last-writer-wins, never two flagged holders.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{CorralError, CorralResult};
use crate::event_log::{EventCategory, EventDraft, EventLog, EventSeverity};
use crate::health::HealthAggregator;
use crate::store::ClusterStore;
use crate::types::{ClusterId, ClusterNode, NodeStatus};

/// The two elected roles a cluster tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionRole {
    Primary,
    Coordinator,
}

impl ElectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Coordinator => "coordinator",
        }
    }

    fn is_set(&self, node: &ClusterNode) -> bool {
        match self {
            Self::Primary => node.is_primary,
            Self::Coordinator => node.is_coordinator,
        }
    }

    fn set(&self, node: &mut ClusterNode, value: bool) {
        match self {
            Self::Primary => node.is_primary = value,
            Self::Coordinator => node.is_coordinator = value,
        }
    }
}

impl std::fmt::Display for ElectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an online node currently holds each elected role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinationReport {
    pub has_primary: bool,
    pub primary_node: Option<String>,
    pub has_coordinator: bool,
    pub coordinator_node: Option<String>,
}

/// Derive the coordination report from a node snapshot. Only online holders
/// count; a flag on an offline node is a leftover the next transition clears.
pub fn coordination_report(nodes: &[ClusterNode]) -> CoordinationReport {
    let primary = nodes.iter().find(|n| n.is_primary && n.is_online());
    let coordinator = nodes.iter().find(|n| n.is_coordinator && n.is_online());
    CoordinationReport {
        has_primary: primary.is_some(),
        primary_node: primary.map(|n| n.external_id.clone()),
        has_coordinator: coordinator.is_some(),
        coordinator_node: coordinator.map(|n| n.external_id.clone()),
    }
}

/// Result of a promotion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionResponse {
    pub success: bool,
    pub message: String,
    pub cluster_id: String,
    pub node_id: String,
    pub role: ElectionRole,
    /// External id of the node that held the role before this promotion
    pub previous_holder: Option<String>,
}

pub struct ElectionCoordinator {
    store: Arc<ClusterStore>,
    events: Arc<EventLog>,
    health: Arc<HealthAggregator>,
}

impl ElectionCoordinator {
    pub fn new(
        store: Arc<ClusterStore>,
        events: Arc<EventLog>,
        health: Arc<HealthAggregator>,
    ) -> Self {
        Self {
            store,
            events,
            health,
        }
    }

    /// Promote a node to primary, demoting any prior holder.
    pub async fn promote_to_primary(&self, node_external_id: &str) -> CorralResult<PromotionResponse> {
        self.promote(node_external_id, ElectionRole::Primary).await
    }

    /// Promote a node to coordinator, demoting any prior holder.
    pub async fn promote_to_coordinator(
        &self,
        node_external_id: &str,
    ) -> CorralResult<PromotionResponse> {
        self.promote(node_external_id, ElectionRole::Coordinator)
            .await
    }

    /// Pure read: online primary/coordinator presence for a cluster.
    pub async fn check_cluster_coordination(
        &self,
        cluster_id: ClusterId,
    ) -> CorralResult<CoordinationReport> {
        // Resolve first so an unknown cluster surfaces as NotFound rather
        // than an empty report.
        self.store.cluster(cluster_id).await?;
        Ok(coordination_report(&self.store.nodes_of_cluster(cluster_id)))
    }

    async fn promote(
        &self,
        node_external_id: &str,
        role: ElectionRole,
    ) -> CorralResult<PromotionResponse> {
        let target = self.store.node_by_external(node_external_id)?;
        let cluster = self.store.cluster(target.cluster_id).await?;

        let lock = self.store.coordination_lock(target.cluster_id);
        let previous_holder;
        {
            let _guard = lock.lock().await;

            // Re-read under the lock: the target may have transitioned since
            // the resolve above.
            let target = self.store.node(target.id)?;
            if target.status != NodeStatus::Online {
                return Err(CorralError::Promotion {
                    message: format!(
                        "node {} is {}; only online nodes can be promoted to {}",
                        target.external_id, target.status, role
                    ),
                });
            }

            let peers = self.store.nodes_of_cluster(target.cluster_id);
            previous_holder = peers
                .iter()
                .find(|n| role.is_set(n) && n.id != target.id)
                .map(|n| n.external_id.clone());

            for peer in &peers {
                if role.is_set(peer) && peer.id != target.id {
                    self.store.with_node_mut(peer.id, |n| {
                        role.set(n, false);
                        n.updated_at = Utc::now();
                    })?;
                }
            }
            self.store.with_node_mut(target.id, |n| {
                role.set(n, true);
                n.updated_at = Utc::now();
            })?;

            self.health.recompute_locked(target.cluster_id).await?;
        }

        info!(
            node_id = %node_external_id,
            cluster_id = %cluster.external_id,
            role = %role,
            previous = previous_holder.as_deref().unwrap_or("none"),
            "node promoted"
        );

        self.events
            .append(
                EventDraft::new(
                    target.cluster_id,
                    "node_promoted",
                    EventCategory::Election,
                    EventSeverity::Info,
                    format!("Node {} promoted to {}", node_external_id, role),
                )
                .with_node(target.id)
                .with_description(format!(
                    "Node '{}' is now the {} for cluster '{}'",
                    node_external_id, role, cluster.name
                ))
                .with_details(serde_json::json!({
                    "role": role.as_str(),
                    "node_id": node_external_id,
                    "previous_holder": previous_holder.clone(),
                }))
                .with_source_agent("election-coordinator"),
            )
            .await;

        Ok(PromotionResponse {
            success: true,
            message: format!("node {} promoted to {}", node_external_id, role),
            cluster_id: cluster.external_id,
            node_id: node_external_id.to_string(),
            role,
            previous_holder,
        })
    }
}
