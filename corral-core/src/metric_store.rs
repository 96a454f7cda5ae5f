//! Append-only time-series metric store
//!
//! Holds time-stamped numeric samples per cluster/node. Batch ingestion is
//! all-or-nothing: one malformed value aborts the entire batch before
//! anything is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CorralError, CorralResult};
use crate::types::{ClusterId, NodeId};

/// Metric sample type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Gauge,
    Counter,
}

/// One time-stamped numeric sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMetric {
    pub id: Uuid,
    pub cluster_id: ClusterId,
    pub node_id: Option<NodeId>,
    pub name: String,
    pub category: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: Option<String>,
    pub dimensions: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub collection_method: String,
    pub source_agent: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only metric sink
pub struct MetricStore {
    samples: RwLock<Vec<ClusterMetric>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
        }
    }

    /// Record a batch of named values as gauge samples.
    ///
    /// Every value must be a finite number; the first malformed value fails
    /// the whole batch and nothing is persisted. Returns the number of
    /// samples written.
    pub async fn record_batch(
        &self,
        cluster_id: ClusterId,
        node_id: Option<NodeId>,
        source_agent: &str,
        values: &HashMap<String, serde_json::Value>,
    ) -> CorralResult<usize> {
        let recorded_at = Utc::now();

        // Parse the entire batch before touching the store.
        let mut parsed = Vec::with_capacity(values.len());
        for (name, raw) in values {
            let value = raw
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CorralError::validation(
                    name.clone(),
                    format!("metric value {} is not a finite number", raw),
                ))?;
            parsed.push(ClusterMetric {
                id: Uuid::new_v4(),
                cluster_id,
                node_id,
                name: name.clone(),
                category: "cluster".to_string(),
                metric_type: MetricType::Gauge,
                value,
                unit: None,
                dimensions: HashMap::new(),
                labels: HashMap::new(),
                collection_method: "agent_push".to_string(),
                source_agent: source_agent.to_string(),
                recorded_at,
            });
        }

        let written = parsed.len();
        self.samples.write().await.extend(parsed);
        debug!(
            cluster_id = %cluster_id,
            count = written,
            "recorded metric batch"
        );
        Ok(written)
    }

    /// Recent-first samples for a cluster, optionally restricted to one
    /// metric name.
    pub async fn samples_for_cluster(
        &self,
        cluster_id: ClusterId,
        name: Option<&str>,
        limit: usize,
    ) -> Vec<ClusterMetric> {
        let samples = self.samples.read().await;
        samples
            .iter()
            .rev()
            .filter(|m| m.cluster_id == cluster_id)
            .filter(|m| name.map_or(true, |n| m.name == n))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of samples recorded so far, across all clusters.
    pub async fn len(&self) -> usize {
        self.samples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.is_empty()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}
