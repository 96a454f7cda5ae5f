//! Top-level wiring for the coordination core
//!
//! `ClusterManager` owns the shared store, the event and metric sinks, and
//! the component registries, and exposes the operation surface external
//! collaborators call: cluster lifecycle, node lifecycle and heartbeat
//! ingestion, election, and the observability sink/read operations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster_registry::{
    ClusterHealthSummary, ClusterInfo, ClusterRegistry, CreateClusterRequest,
    CreateClusterResponse, DecommissionResponse,
};
use crate::config::{EventLogConfig, HealthConfig, RegistryConfig};
use crate::election::{CoordinationReport, ElectionCoordinator, PromotionResponse};
use crate::error::{CorralError, CorralResult};
use crate::event_log::{EventFilter, EventLog, EventPage};
use crate::health::HealthAggregator;
use crate::metric_store::MetricStore;
use crate::node_registry::{
    AddNodeRequest, AddNodeResponse, NodeRegistry, ReportNodeStatusResponse,
};
use crate::store::ClusterStore;
use crate::types::{MetricsUpdate, NodeHealth, NodeStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetricsResponse {
    pub success: bool,
    pub message: String,
    pub cluster_id: String,
    pub samples_written: usize,
}

pub struct ClusterManager {
    store: Arc<ClusterStore>,
    events: Arc<EventLog>,
    metrics: Arc<MetricStore>,
    health: Arc<HealthAggregator>,
    election: ElectionCoordinator,
    clusters: ClusterRegistry,
    nodes: NodeRegistry,
}

impl ClusterManager {
    /// Manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(
            HealthConfig::default(),
            RegistryConfig::default(),
            EventLogConfig::default(),
        )
    }

    pub fn with_config(
        health_config: HealthConfig,
        registry_config: RegistryConfig,
        event_config: EventLogConfig,
    ) -> Self {
        let store = Arc::new(ClusterStore::new());
        let events = Arc::new(EventLog::new(event_config));
        let metrics = Arc::new(MetricStore::new());
        let health = Arc::new(HealthAggregator::new(store.clone(), health_config.clone()));

        let election = ElectionCoordinator::new(store.clone(), events.clone(), health.clone());
        let clusters = ClusterRegistry::new(
            store.clone(),
            events.clone(),
            health.clone(),
            health_config,
        );
        let nodes = NodeRegistry::new(
            store.clone(),
            events.clone(),
            health.clone(),
            registry_config,
        );

        Self {
            store,
            events,
            metrics,
            health,
            election,
            clusters,
            nodes,
        }
    }

    // Cluster lifecycle

    pub async fn create_cluster(
        &self,
        request: CreateClusterRequest,
    ) -> CorralResult<CreateClusterResponse> {
        self.clusters.create_cluster(request).await
    }

    /// All clusters as summaries, or one cluster in full.
    pub async fn get_cluster_info(
        &self,
        cluster_external_id: Option<&str>,
    ) -> CorralResult<ClusterInfo> {
        match cluster_external_id {
            None => Ok(ClusterInfo::All(self.clusters.list_clusters().await)),
            Some(external) => Ok(ClusterInfo::One(Box::new(
                self.clusters.get_cluster(external).await?,
            ))),
        }
    }

    pub async fn get_cluster_health_summary(
        &self,
        cluster_external_id: Option<&str>,
    ) -> CorralResult<Vec<ClusterHealthSummary>> {
        self.clusters
            .get_cluster_health_summary(cluster_external_id)
            .await
    }

    pub async fn decommission_cluster(
        &self,
        cluster_external_id: &str,
        force: bool,
    ) -> CorralResult<DecommissionResponse> {
        self.clusters
            .decommission_cluster(cluster_external_id, force)
            .await
    }

    pub async fn finalize_decommission(
        &self,
        cluster_external_id: &str,
    ) -> CorralResult<DecommissionResponse> {
        self.clusters.finalize_decommission(cluster_external_id).await
    }

    pub async fn set_tenant_count(
        &self,
        cluster_external_id: &str,
        tenant_count: u32,
    ) -> CorralResult<()> {
        self.clusters
            .set_tenant_count(cluster_external_id, tenant_count)
            .await
    }

    // Node lifecycle and heartbeat ingestion

    pub async fn add_cluster_node(&self, request: AddNodeRequest) -> CorralResult<AddNodeResponse> {
        self.nodes.add_node(request).await
    }

    pub async fn update_node_status(
        &self,
        node_external_id: &str,
        status: NodeStatus,
        health: Option<NodeHealth>,
        metrics: Option<MetricsUpdate>,
    ) -> CorralResult<ReportNodeStatusResponse> {
        self.nodes
            .report_node_status(node_external_id, status, health, metrics)
            .await
    }

    pub fn verify_node_token(&self, node_external_id: &str, token: &str) -> CorralResult<bool> {
        self.nodes.verify_node_token(node_external_id, token)
    }

    // Election

    pub async fn promote_to_primary(
        &self,
        node_external_id: &str,
    ) -> CorralResult<PromotionResponse> {
        self.election.promote_to_primary(node_external_id).await
    }

    pub async fn promote_to_coordinator(
        &self,
        node_external_id: &str,
    ) -> CorralResult<PromotionResponse> {
        self.election.promote_to_coordinator(node_external_id).await
    }

    pub async fn check_cluster_coordination(
        &self,
        cluster_external_id: &str,
    ) -> CorralResult<CoordinationReport> {
        let id = self.store.cluster_id_by_external(cluster_external_id).await?;
        self.election.check_cluster_coordination(id).await
    }

    // Observability sink/read

    pub async fn get_cluster_events(
        &self,
        cluster_external_id: &str,
        filter: EventFilter,
    ) -> CorralResult<EventPage> {
        let id = self.store.cluster_id_by_external(cluster_external_id).await?;
        Ok(self.events.events_for_cluster(id, &filter).await)
    }

    /// Record a batch of gauge samples for a cluster, optionally attributed
    /// to one of its nodes. All-or-nothing: any malformed value rejects the
    /// whole batch.
    pub async fn record_cluster_metrics(
        &self,
        cluster_external_id: &str,
        node_external_id: Option<&str>,
        values: &HashMap<String, serde_json::Value>,
    ) -> CorralResult<RecordMetricsResponse> {
        let cluster = self.store.cluster_by_external(cluster_external_id).await?;

        let (node_id, source_agent) = match node_external_id {
            Some(external) => {
                let node = self.store.node_by_external(external)?;
                if node.cluster_id != cluster.id {
                    return Err(CorralError::validation(
                        "node_id",
                        format!(
                            "node {} does not belong to cluster {}",
                            external, cluster_external_id
                        ),
                    ));
                }
                (Some(node.id), external.to_string())
            }
            None => (None, "external-agent".to_string()),
        };

        let samples_written = self
            .metrics
            .record_batch(cluster.id, node_id, &source_agent, values)
            .await?;

        Ok(RecordMetricsResponse {
            success: true,
            message: format!(
                "recorded {} sample(s) for cluster {}",
                samples_written, cluster_external_id
            ),
            cluster_id: cluster_external_id.to_string(),
            samples_written,
        })
    }

    // Component access for embedding callers

    pub fn store(&self) -> &Arc<ClusterStore> {
        &self.store
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn metric_store(&self) -> &Arc<MetricStore> {
        &self.metrics
    }

    pub fn health_aggregator(&self) -> &Arc<HealthAggregator> {
        &self.health
    }
}

impl Default for ClusterManager {
    fn default() -> Self {
        Self::new()
    }
}
