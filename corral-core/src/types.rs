//! Core domain types for cluster coordination
//!
//! Identifiers, status enums, and the cluster/node entities shared by the
//! registries, the election coordinator, and the health aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    /// Create a new random cluster ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a cluster node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a human-assignable external identifier with the given prefix,
/// e.g. `cl-3fa85f641f2a` or `nd-9b2c0e7d4a11`.
pub fn external_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..12])
}

/// Generate an opaque node authentication token.
///
/// The plain token is returned to the caller exactly once at node creation;
/// only its digest is stored.
pub fn generate_auth_token(length: usize) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest of an auth token, the only form the registry retains.
pub fn token_digest(token: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cluster lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Initializing,
    Active,
    Degraded,
    Decommissioning,
    Decommissioned,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Decommissioning => "decommissioning",
            Self::Decommissioned => "decommissioned",
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Provisioning,
    Online,
    Offline,
    Decommissioning,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Decommissioning => "decommissioning",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node health as reported by heartbeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Unknown,
    Healthy,
    Warning,
    Critical,
}

impl NodeHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity ceilings for a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLimits {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    #[serde(default = "default_max_tenants")]
    pub max_tenants: u32,
    #[serde(default = "default_max_storage_gb")]
    pub max_storage_gb: u64,
}

impl Default for ClusterLimits {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_tenants: default_max_tenants(),
            max_storage_gb: default_max_storage_gb(),
        }
    }
}

fn default_max_nodes() -> u32 {
    10
}

fn default_max_tenants() -> u32 {
    100
}

fn default_max_storage_gb() -> u64 {
    1000
}

/// Declared or observed node resources
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeResources {
    pub cpu_cores: f64,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub network_mbps: f64,
}

impl NodeResources {
    pub fn zero() -> Self {
        Self {
            cpu_cores: 0.0,
            memory_gb: 0.0,
            storage_gb: 0.0,
            network_mbps: 0.0,
        }
    }
}

impl Default for NodeResources {
    fn default() -> Self {
        Self {
            cpu_cores: 4.0,
            memory_gb: 16.0,
            storage_gb: 100.0,
            network_mbps: 1000.0,
        }
    }
}

/// Network identity of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeNetwork {
    pub hostname: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
}

/// Live node metrics carried by heartbeats
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub load_average: f64,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub disk_usage_percent: f64,
    pub network_io_mbps: f64,
}

/// Partial metrics update; unspecified fields leave the stored value unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub load_average: Option<f64>,
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_percent: Option<f64>,
    pub disk_usage_percent: Option<f64>,
    pub network_io_mbps: Option<f64>,
}

impl NodeMetrics {
    /// Merge the supplied fields into this metrics snapshot.
    pub fn apply(&mut self, update: &MetricsUpdate) {
        if let Some(v) = update.load_average {
            self.load_average = v;
        }
        if let Some(v) = update.cpu_usage_percent {
            self.cpu_usage_percent = v;
        }
        if let Some(v) = update.memory_usage_percent {
            self.memory_usage_percent = v;
        }
        if let Some(v) = update.disk_usage_percent {
            self.disk_usage_percent = v;
        }
        if let Some(v) = update.network_io_mbps {
            self.network_io_mbps = v;
        }
    }
}

/// A named, bounded group of nodes forming one coordination domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub region: String,
    pub version: String,
    pub status: ClusterStatus,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
    pub limits: ClusterLimits,
    pub tags: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Count of tenant associations maintained by the external tenant domain;
    /// consulted only by the decommission guard.
    pub tenant_count: u32,
    /// Derived [0,1] health aggregate; recomputed synchronously after any
    /// node status or election change in this cluster.
    pub health_score: f64,
    pub last_health_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub decommissioned_at: Option<DateTime<Utc>>,
}

/// A single addressable compute unit registered under a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: NodeId,
    pub external_id: String,
    pub cluster_id: ClusterId,
    pub name: String,
    pub status: NodeStatus,
    pub health: NodeHealth,
    pub region: String,
    pub availability_zone: Option<String>,
    pub network: NodeNetwork,
    pub capacity: NodeResources,
    pub usage: NodeResources,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    pub metrics: NodeMetrics,
    pub is_primary: bool,
    pub is_coordinator: bool,
    /// Tie-breaking priority; higher sorts first in cluster listings.
    pub priority: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_restart: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    /// SHA-256 hex digest of the auth token issued at creation. The plain
    /// token is never stored.
    pub token_digest: String,
    pub config: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClusterNode {
    /// Whether this node currently counts toward election invariants.
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}

/// Order nodes for cluster listings: priority descending, then creation
/// time ascending.
pub fn sort_nodes_for_listing(nodes: &mut [ClusterNode]) {
    nodes.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
