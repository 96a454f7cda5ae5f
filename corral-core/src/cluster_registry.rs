//! Cluster registry: top-level CRUD and lifecycle
//!
//! Owns the `Cluster` records and their state machine
//! (`initializing -> active -> degraded -> decommissioning ->
//! decommissioned`). The score-driven transitions live in the health
//! aggregator; this module handles creation, inspection, and the guarded
//! decommission path.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::HealthConfig;
use crate::election::{coordination_report, CoordinationReport};
use crate::error::{CorralError, CorralResult};
use crate::event_log::{EventCategory, EventDraft, EventLog, EventSeverity};
use crate::health::HealthAggregator;
use crate::store::ClusterStore;
use crate::types::{
    external_id, sort_nodes_for_listing, Cluster, ClusterLimits, ClusterNode, ClusterStatus,
    NodeHealth, NodeStatus,
};

/// Input for cluster creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    pub name: String,
    pub region: String,
    pub description: Option<String>,
    pub version: String,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
    pub limits: ClusterLimits,
    pub tags: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl CreateClusterRequest {
    /// Request with the required fields; everything else defaults.
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            description: None,
            version: "1.0.0".to_string(),
            config: serde_json::json!({}),
            metadata: serde_json::json!({}),
            limits: ClusterLimits::default(),
            tags: Vec::new(),
            labels: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClusterResponse {
    pub success: bool,
    pub message: String,
    pub cluster_id: String,
    pub name: String,
    pub status: ClusterStatus,
}

/// Summary row for cluster listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: String,
    pub name: String,
    pub region: String,
    pub version: String,
    pub status: ClusterStatus,
    pub health_score: f64,
    pub node_count: usize,
    pub created_at: chrono::DateTime<Utc>,
}

/// Node counts derived for a single cluster
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeCounts {
    pub total: usize,
    pub online: usize,
    pub healthy: usize,
}

/// Full view of one cluster: record, ordered nodes, coordination, counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDetail {
    pub cluster: Cluster,
    /// Nodes ordered by priority descending, then creation time ascending
    pub nodes: Vec<ClusterNode>,
    pub coordination: CoordinationReport,
    pub counts: NodeCounts,
}

/// Result of `get_cluster_info`: all clusters, or one in full
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterInfo {
    All(Vec<ClusterSummary>),
    One(Box<ClusterDetail>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecommissionResponse {
    pub success: bool,
    pub message: String,
    pub cluster_id: String,
    pub status: ClusterStatus,
    pub nodes_decommissioned: usize,
    pub forced: bool,
}

/// Per-status node counts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeStatusCounts {
    pub provisioning: usize,
    pub online: usize,
    pub offline: usize,
    pub decommissioning: usize,
}

/// Per-health-bucket node counts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeHealthCounts {
    pub unknown: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

/// Health roll-up for one cluster, with operator recommendations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterHealthSummary {
    pub cluster_id: String,
    pub name: String,
    pub status: ClusterStatus,
    pub health_score: f64,
    pub nodes_by_status: NodeStatusCounts,
    pub nodes_by_health: NodeHealthCounts,
    /// An online node currently holds the role
    pub has_primary: bool,
    pub has_coordinator: bool,
    pub recommendations: Vec<String>,
}

/// Rule checks behind the health summary's recommendation strings.
fn recommendations(
    online: usize,
    coordination: &CoordinationReport,
    health_score: f64,
    threshold: f64,
) -> Vec<String> {
    let mut out = Vec::new();
    if online == 0 {
        out.push("No online nodes; verify node agents are running and reachable".to_string());
    }
    if !coordination.has_primary {
        out.push("No online primary; promote an online node to primary".to_string());
    }
    if !coordination.has_coordinator {
        out.push("No online coordinator; promote an online node to coordinator".to_string());
    }
    if health_score < threshold {
        out.push(format!(
            "Health score {:.2} is below the {:.2} threshold; investigate node health",
            health_score, threshold
        ));
    }
    out
}

pub struct ClusterRegistry {
    store: Arc<ClusterStore>,
    events: Arc<EventLog>,
    health: Arc<HealthAggregator>,
    health_config: HealthConfig,
}

impl ClusterRegistry {
    pub fn new(
        store: Arc<ClusterStore>,
        events: Arc<EventLog>,
        health: Arc<HealthAggregator>,
        health_config: HealthConfig,
    ) -> Self {
        Self {
            store,
            events,
            health,
            health_config,
        }
    }

    /// Create a cluster in status `initializing`.
    pub async fn create_cluster(
        &self,
        request: CreateClusterRequest,
    ) -> CorralResult<CreateClusterResponse> {
        if request.name.trim().is_empty() {
            return Err(CorralError::validation("name", "must not be empty"));
        }
        if request.region.trim().is_empty() {
            return Err(CorralError::validation("region", "must not be empty"));
        }

        let now = Utc::now();
        let cluster = Cluster {
            id: crate::types::ClusterId::new(),
            external_id: external_id("cl"),
            name: request.name.clone(),
            description: request.description,
            region: request.region.clone(),
            version: request.version,
            status: ClusterStatus::Initializing,
            config: request.config,
            metadata: request.metadata,
            limits: request.limits,
            tags: request.tags,
            labels: request.labels,
            tenant_count: 0,
            health_score: 0.0,
            last_health_check: None,
            created_at: now,
            updated_at: now,
            activated_at: None,
            decommissioned_at: None,
        };
        let cluster_id = cluster.id;
        let cluster_external = cluster.external_id.clone();
        self.store.insert_cluster(cluster).await?;

        info!(
            cluster_id = %cluster_external,
            name = %request.name,
            region = %request.region,
            "cluster created"
        );

        self.events
            .append(
                EventDraft::new(
                    cluster_id,
                    "cluster_created",
                    EventCategory::Lifecycle,
                    EventSeverity::Info,
                    format!("Cluster {} created", request.name),
                )
                .with_description(format!(
                    "Cluster '{}' created in region '{}'",
                    request.name, request.region
                ))
                .with_details(serde_json::json!({
                    "cluster_id": cluster_external.clone(),
                    "name": request.name.clone(),
                    "region": request.region,
                }))
                .with_source_agent("cluster-registry"),
            )
            .await;

        Ok(CreateClusterResponse {
            success: true,
            message: format!("cluster {} created", cluster_external),
            cluster_id: cluster_external,
            name: request.name,
            status: ClusterStatus::Initializing,
        })
    }

    /// Summaries of every cluster, oldest first.
    pub async fn list_clusters(&self) -> Vec<ClusterSummary> {
        let clusters = self.store.list_clusters().await;
        clusters
            .into_iter()
            .map(|c| {
                let node_count = self.store.node_count(c.id);
                ClusterSummary {
                    cluster_id: c.external_id,
                    name: c.name,
                    region: c.region,
                    version: c.version,
                    status: c.status,
                    health_score: c.health_score,
                    node_count,
                    created_at: c.created_at,
                }
            })
            .collect()
    }

    /// Full view of one cluster.
    pub async fn get_cluster(&self, cluster_external_id: &str) -> CorralResult<ClusterDetail> {
        let cluster = self.store.cluster_by_external(cluster_external_id).await?;
        let mut nodes = self.store.nodes_of_cluster(cluster.id);
        sort_nodes_for_listing(&mut nodes);

        let coordination = coordination_report(&nodes);
        let counts = NodeCounts {
            total: nodes.len(),
            online: nodes.iter().filter(|n| n.is_online()).count(),
            healthy: nodes
                .iter()
                .filter(|n| n.health == NodeHealth::Healthy)
                .count(),
        };

        Ok(ClusterDetail {
            cluster,
            nodes,
            coordination,
            counts,
        })
    }

    /// Transition a cluster and all its nodes to `decommissioning`.
    ///
    /// Without `force` this fails unless every node is already
    /// decommissioning and no tenant associations remain, the guardrail
    /// against silently orphaning live workloads.
    pub async fn decommission_cluster(
        &self,
        cluster_external_id: &str,
        force: bool,
    ) -> CorralResult<DecommissionResponse> {
        let cluster = self.store.cluster_by_external(cluster_external_id).await?;
        if cluster.status == ClusterStatus::Decommissioned {
            return Err(CorralError::precondition(format!(
                "cluster {} is already decommissioned",
                cluster.external_id
            )));
        }

        let lock = self.store.coordination_lock(cluster.id);
        let prior_node_count;
        let prior_tenant_count;
        {
            let _guard = lock.lock().await;
            // Re-read under the lock so the tenant guard sees the latest
            // count from set_tenant_count.
            let cluster = self.store.cluster(cluster.id).await?;
            let nodes = self.store.nodes_of_cluster(cluster.id);

            if !force {
                if let Some(active) = nodes
                    .iter()
                    .find(|n| n.status != NodeStatus::Decommissioning)
                {
                    return Err(CorralError::precondition(format!(
                        "node {} is still {}; decommission nodes first or pass force",
                        active.external_id, active.status
                    )));
                }
                if cluster.tenant_count > 0 {
                    return Err(CorralError::precondition(format!(
                        "cluster {} still has {} tenant association(s); detach them first or pass force",
                        cluster.external_id, cluster.tenant_count
                    )));
                }
            }

            prior_node_count = nodes.len();
            prior_tenant_count = cluster.tenant_count;

            for node in &nodes {
                if node.status != NodeStatus::Decommissioning {
                    self.store.with_node_mut(node.id, |n| {
                        n.status = NodeStatus::Decommissioning;
                        n.is_primary = false;
                        n.is_coordinator = false;
                        n.updated_at = Utc::now();
                    })?;
                }
            }

            self.store
                .with_cluster_mut(cluster.id, |c| {
                    let now = Utc::now();
                    c.status = ClusterStatus::Decommissioning;
                    c.decommissioned_at = Some(now);
                    c.updated_at = now;
                })
                .await?;

            self.health.recompute_locked(cluster.id).await?;
        }

        warn!(
            cluster_id = %cluster.external_id,
            force,
            nodes = prior_node_count,
            "cluster decommissioning"
        );

        self.events
            .append(
                EventDraft::new(
                    cluster.id,
                    "cluster_decommissioned",
                    EventCategory::Lifecycle,
                    EventSeverity::Warning,
                    format!("Cluster {} decommissioned", cluster.name),
                )
                .with_description(format!(
                    "Cluster '{}' and its {} node(s) moved to decommissioning",
                    cluster.name, prior_node_count
                ))
                .with_details(serde_json::json!({
                    "cluster_id": cluster.external_id.clone(),
                    "force": force,
                    "node_count": prior_node_count,
                    "tenant_count": prior_tenant_count,
                }))
                .with_source_agent("cluster-registry"),
            )
            .await;

        Ok(DecommissionResponse {
            success: true,
            message: format!("cluster {} decommissioning", cluster.external_id),
            cluster_id: cluster.external_id.clone(),
            status: ClusterStatus::Decommissioning,
            nodes_decommissioned: prior_node_count,
            forced: force,
        })
    }

    /// Complete `decommissioning -> decommissioned`. Terminal.
    pub async fn finalize_decommission(
        &self,
        cluster_external_id: &str,
    ) -> CorralResult<DecommissionResponse> {
        let cluster = self.store.cluster_by_external(cluster_external_id).await?;
        if cluster.status != ClusterStatus::Decommissioning {
            return Err(CorralError::precondition(format!(
                "cluster {} is {}; only decommissioning clusters can be finalized",
                cluster.external_id, cluster.status
            )));
        }

        let lock = self.store.coordination_lock(cluster.id);
        let node_count;
        {
            let _guard = lock.lock().await;
            let nodes = self.store.nodes_of_cluster(cluster.id);
            if let Some(active) = nodes
                .iter()
                .find(|n| n.status != NodeStatus::Decommissioning)
            {
                return Err(CorralError::precondition(format!(
                    "node {} is still {}; cannot finalize decommission",
                    active.external_id, active.status
                )));
            }
            node_count = nodes.len();

            self.store
                .with_cluster_mut(cluster.id, |c| {
                    c.status = ClusterStatus::Decommissioned;
                    c.updated_at = Utc::now();
                })
                .await?;
        }

        info!(cluster_id = %cluster.external_id, "cluster decommission completed");

        self.events
            .append(
                EventDraft::new(
                    cluster.id,
                    "cluster_decommission_completed",
                    EventCategory::Lifecycle,
                    EventSeverity::Info,
                    format!("Cluster {} decommission completed", cluster.name),
                )
                .with_details(serde_json::json!({
                    "cluster_id": cluster.external_id.clone(),
                    "node_count": node_count,
                }))
                .with_source_agent("cluster-registry"),
            )
            .await;

        Ok(DecommissionResponse {
            success: true,
            message: format!("cluster {} decommissioned", cluster.external_id),
            cluster_id: cluster.external_id.clone(),
            status: ClusterStatus::Decommissioned,
            nodes_decommissioned: node_count,
            forced: false,
        })
    }

    /// Health roll-up for one cluster or all of them.
    pub async fn get_cluster_health_summary(
        &self,
        cluster_external_id: Option<&str>,
    ) -> CorralResult<Vec<ClusterHealthSummary>> {
        let clusters = match cluster_external_id {
            Some(external) => vec![self.store.cluster_by_external(external).await?],
            None => self.store.list_clusters().await,
        };

        let mut summaries = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let nodes = self.store.nodes_of_cluster(cluster.id);

            let mut by_status = NodeStatusCounts::default();
            for node in &nodes {
                match node.status {
                    NodeStatus::Provisioning => by_status.provisioning += 1,
                    NodeStatus::Online => by_status.online += 1,
                    NodeStatus::Offline => by_status.offline += 1,
                    NodeStatus::Decommissioning => by_status.decommissioning += 1,
                }
            }

            let mut by_health = NodeHealthCounts::default();
            for node in &nodes {
                match node.health {
                    NodeHealth::Unknown => by_health.unknown += 1,
                    NodeHealth::Healthy => by_health.healthy += 1,
                    NodeHealth::Warning => by_health.warning += 1,
                    NodeHealth::Critical => by_health.critical += 1,
                }
            }

            let coordination = coordination_report(&nodes);
            let recommendations = recommendations(
                by_status.online,
                &coordination,
                cluster.health_score,
                self.health_config.degraded_threshold,
            );

            summaries.push(ClusterHealthSummary {
                cluster_id: cluster.external_id,
                name: cluster.name,
                status: cluster.status,
                health_score: cluster.health_score,
                nodes_by_status: by_status,
                nodes_by_health: by_health,
                has_primary: coordination.has_primary,
                has_coordinator: coordination.has_coordinator,
                recommendations,
            });
        }

        Ok(summaries)
    }

    /// Hook for the external tenant domain: record how many tenant
    /// associations reference this cluster. Consulted by the decommission
    /// guard.
    pub async fn set_tenant_count(
        &self,
        cluster_external_id: &str,
        tenant_count: u32,
    ) -> CorralResult<()> {
        let id = self.store.cluster_id_by_external(cluster_external_id).await?;
        self.store
            .with_cluster_mut(id, |c| {
                c.tenant_count = tenant_count;
                c.updated_at = Utc::now();
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendations_cover_each_rule() {
        let empty = CoordinationReport::default();
        let recs = recommendations(0, &empty, 0.0, 0.7);
        assert_eq!(recs.len(), 4);
        assert!(recs[0].contains("No online nodes"));
        assert!(recs[1].contains("No online primary"));
        assert!(recs[2].contains("No online coordinator"));
        assert!(recs[3].contains("below the 0.70 threshold"));

        let full = CoordinationReport {
            has_primary: true,
            primary_node: Some("nd-1".to_string()),
            has_coordinator: true,
            coordinator_node: Some("nd-2".to_string()),
        };
        assert!(recommendations(3, &full, 0.95, 0.7).is_empty());
    }
}
