//! Node registry: CRUD and state machine for nodes within a cluster
//!
//! Nodes are created in `provisioning`, move to `online` on the first
//! accepted heartbeat, and are torn down by transitioning to
//! `decommissioning`. They are never deleted, so their event and metric
//! history survives them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::error::{CorralError, CorralResult};
use crate::event_log::{EventCategory, EventDraft, EventLog, EventSeverity};
use crate::health::HealthAggregator;
use crate::store::ClusterStore;
use crate::types::{
    external_id, generate_auth_token, token_digest, ClusterNode, ClusterStatus, MetricsUpdate,
    NodeHealth, NodeMetrics, NodeNetwork, NodeResources, NodeStatus,
};

/// Input for node registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNodeRequest {
    /// External id of the owning cluster
    pub cluster_id: String,
    pub name: String,
    pub region: String,
    pub availability_zone: Option<String>,
    pub hostname: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub capacity: NodeResources,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
    pub priority: i32,
}

impl AddNodeRequest {
    /// Request with the required fields; everything else defaults.
    pub fn new(
        cluster_id: impl Into<String>,
        name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            name: name.into(),
            region: region.into(),
            availability_zone: None,
            hostname: None,
            private_ip: None,
            public_ip: None,
            capacity: NodeResources::default(),
            roles: vec!["worker".to_string()],
            capabilities: Vec::new(),
            config: serde_json::json!({}),
            metadata: serde_json::json!({}),
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNodeResponse {
    pub success: bool,
    pub message: String,
    pub node_id: String,
    pub cluster_id: String,
    pub status: NodeStatus,
    /// The plain auth token, returned here and never again; the registry
    /// retains only its digest.
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportNodeStatusResponse {
    pub success: bool,
    pub message: String,
    pub node_id: String,
    pub status: NodeStatus,
    pub health: NodeHealth,
    /// Whether this report changed status or health (and therefore emitted
    /// a `node_status_changed` event)
    pub status_changed: bool,
}

pub struct NodeRegistry {
    store: Arc<ClusterStore>,
    events: Arc<EventLog>,
    health: Arc<HealthAggregator>,
    config: RegistryConfig,
}

impl NodeRegistry {
    pub fn new(
        store: Arc<ClusterStore>,
        events: Arc<EventLog>,
        health: Arc<HealthAggregator>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            events,
            health,
            config,
        }
    }

    /// Register a node under a cluster.
    ///
    /// The node starts in `provisioning` with health `unknown`. The response
    /// carries the plain auth token exactly once.
    pub async fn add_node(&self, request: AddNodeRequest) -> CorralResult<AddNodeResponse> {
        let cluster = self.store.cluster_by_external(&request.cluster_id).await?;
        if matches!(
            cluster.status,
            ClusterStatus::Decommissioning | ClusterStatus::Decommissioned
        ) {
            return Err(CorralError::precondition(format!(
                "cluster {} is {}; nodes can no longer be added",
                cluster.external_id, cluster.status
            )));
        }
        if request.name.trim().is_empty() {
            return Err(CorralError::validation("name", "must not be empty"));
        }

        let node_count = self.store.node_count(cluster.id);
        if node_count as u32 >= cluster.limits.max_nodes {
            return Err(CorralError::precondition(format!(
                "cluster {} already has {} of {} allowed nodes",
                cluster.external_id, node_count, cluster.limits.max_nodes
            )));
        }

        let token = generate_auth_token(self.config.token_length);
        let now = Utc::now();
        let node = ClusterNode {
            id: crate::types::NodeId::new(),
            external_id: external_id("nd"),
            cluster_id: cluster.id,
            name: request.name.clone(),
            status: NodeStatus::Provisioning,
            health: NodeHealth::Unknown,
            region: request.region,
            availability_zone: request.availability_zone,
            network: NodeNetwork {
                hostname: request.hostname,
                private_ip: request.private_ip,
                public_ip: request.public_ip,
            },
            capacity: request.capacity,
            usage: NodeResources::zero(),
            roles: request.roles,
            capabilities: request.capabilities,
            metrics: NodeMetrics::default(),
            is_primary: false,
            is_coordinator: false,
            priority: request.priority,
            last_heartbeat: None,
            last_restart: None,
            uptime_secs: 0,
            token_digest: token_digest(&token),
            config: request.config,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };
        let node_id = node.id;
        let node_external = node.external_id.clone();
        let capacity = node.capacity;
        self.store.insert_node(node)?;

        info!(
            node_id = %node_external,
            cluster_id = %cluster.external_id,
            name = %request.name,
            "node registered"
        );

        self.events
            .append(
                EventDraft::new(
                    cluster.id,
                    "node_added",
                    EventCategory::Lifecycle,
                    EventSeverity::Info,
                    format!("Node {} added", node_external),
                )
                .with_node(node_id)
                .with_description(format!(
                    "Node '{}' registered under cluster '{}'",
                    request.name, cluster.name
                ))
                .with_details(serde_json::json!({
                    "node_id": node_external.clone(),
                    "name": request.name,
                    "capacity_cpu_cores": capacity.cpu_cores,
                    "capacity_memory_gb": capacity.memory_gb,
                    "capacity_storage_gb": capacity.storage_gb,
                    "capacity_network_mbps": capacity.network_mbps,
                }))
                .with_source_agent("node-registry"),
            )
            .await;

        self.health.recompute_cluster_health(cluster.id).await?;

        Ok(AddNodeResponse {
            success: true,
            message: format!("node {} registered in provisioning", node_external),
            node_id: node_external,
            cluster_id: cluster.external_id,
            status: NodeStatus::Provisioning,
            auth_token: token,
        })
    }

    /// Ingest a node heartbeat: status, optional health, optional metrics.
    ///
    /// Always refreshes `last_heartbeat` and merges the supplied metric
    /// fields. A report that changes neither status nor health emits no
    /// event; an actual transition is applied under the cluster's
    /// coordination lock, clears election flags when the node leaves
    /// `online`, and records a `node_status_changed` event with before and
    /// after values. Health is recomputed either way.
    pub async fn report_node_status(
        &self,
        node_external_id: &str,
        status: NodeStatus,
        health: Option<NodeHealth>,
        metrics: Option<MetricsUpdate>,
    ) -> CorralResult<ReportNodeStatusResponse> {
        let node = self.store.node_by_external(node_external_id)?;
        let cluster_id = node.cluster_id;

        let changed =
            status != node.status || health.map_or(false, |h| h != node.health);

        if !changed {
            // Pure heartbeat refresh: only this node's entry is touched.
            let (new_status, new_health) = self.store.with_node_mut(node.id, |n| {
                Self::refresh_heartbeat(n, &metrics);
                (n.status, n.health)
            })?;
            self.health.recompute_cluster_health(cluster_id).await?;
            return Ok(ReportNodeStatusResponse {
                success: true,
                message: format!("heartbeat refreshed for node {}", node_external_id),
                node_id: node_external_id.to_string(),
                status: new_status,
                health: new_health,
                status_changed: false,
            });
        }

        let lock = self.store.coordination_lock(cluster_id);
        let transition;
        {
            let _guard = lock.lock().await;

            // Re-evaluate under the lock; a concurrent report may have
            // already applied this transition.
            let current = self.store.node(node.id)?;
            let prev_status = current.status;
            let prev_health = current.health;
            if prev_status == NodeStatus::Decommissioning && status != NodeStatus::Decommissioning {
                return Err(CorralError::precondition(format!(
                    "node {} is decommissioning and cannot return to {}",
                    node_external_id, status
                )));
            }
            let new_health = health.unwrap_or(prev_health);
            let still_changed = status != prev_status || new_health != prev_health;

            self.store.with_node_mut(node.id, |n| {
                let now = Utc::now();
                if status == NodeStatus::Online && prev_status != NodeStatus::Online {
                    n.last_restart = Some(now);
                    n.uptime_secs = 0;
                }
                if status != NodeStatus::Online && prev_status == NodeStatus::Online {
                    // A node cannot hold an elected role while not online.
                    if n.is_primary || n.is_coordinator {
                        warn!(
                            node_id = %n.external_id,
                            status = %status,
                            "clearing election flags on transition away from online"
                        );
                    }
                    n.is_primary = false;
                    n.is_coordinator = false;
                }
                n.status = status;
                n.health = new_health;
                Self::refresh_heartbeat(n, &metrics);
            })?;

            transition = still_changed.then_some((prev_status, prev_health, new_health));

            self.health.recompute_locked(cluster_id).await?;
        }

        if let Some((prev_status, prev_health, new_health)) = transition {
            info!(
                node_id = %node_external_id,
                from = %prev_status,
                to = %status,
                health = %new_health,
                "node status changed"
            );
            self.events
                .append(
                    EventDraft::new(
                        cluster_id,
                        "node_status_changed",
                        EventCategory::Health,
                        EventSeverity::Info,
                        format!("Node {} is now {}", node_external_id, status),
                    )
                    .with_node(node.id)
                    .with_description(format!(
                        "Node '{}' transitioned from {}/{} to {}/{}",
                        node_external_id, prev_status, prev_health, status, new_health
                    ))
                    .with_details(serde_json::json!({
                        "node_id": node_external_id,
                        "previous_status": prev_status.as_str(),
                        "status": status.as_str(),
                        "previous_health": prev_health.as_str(),
                        "health": new_health.as_str(),
                        "metrics": metrics,
                    }))
                    .with_source_agent("node-registry"),
                )
                .await;
        }

        let updated = self.store.node(node.id)?;
        Ok(ReportNodeStatusResponse {
            success: true,
            message: format!("node {} reported {}", node_external_id, status),
            node_id: node_external_id.to_string(),
            status: updated.status,
            health: updated.health,
            status_changed: transition.is_some(),
        })
    }

    /// Check a presented token against the stored digest. The registry never
    /// returns the token itself.
    pub fn verify_node_token(&self, node_external_id: &str, token: &str) -> CorralResult<bool> {
        let node = self.store.node_by_external(node_external_id)?;
        Ok(node.token_digest == token_digest(token))
    }

    fn refresh_heartbeat(node: &mut ClusterNode, metrics: &Option<MetricsUpdate>) {
        let now = Utc::now();
        node.last_heartbeat = Some(now);
        node.updated_at = now;
        if let Some(update) = metrics {
            node.metrics.apply(update);
            // Observed usage follows the reported utilization percentages.
            node.usage.cpu_cores = node.capacity.cpu_cores * node.metrics.cpu_usage_percent / 100.0;
            node.usage.memory_gb =
                node.capacity.memory_gb * node.metrics.memory_usage_percent / 100.0;
            node.usage.storage_gb =
                node.capacity.storage_gb * node.metrics.disk_usage_percent / 100.0;
            node.usage.network_mbps = node.metrics.network_io_mbps;
        }
        if node.status == NodeStatus::Online {
            if let Some(restarted) = node.last_restart {
                node.uptime_secs = (now - restarted).num_seconds().max(0) as u64;
            }
        }
    }
}
