//! Append-only event log for cluster lifecycle and health occurrences
//!
//! Every mutating operation in the coordination core records what happened
//! here. Events are immutable once written: there is no update or delete
//! surface, and corrections are new events referencing the original via
//! `parent_event_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::EventLogConfig;
use crate::types::{ClusterId, NodeId};

/// Unique identifier for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Cluster and node lifecycle transitions
    Lifecycle,
    /// Health observations and status changes
    Health,
    /// Primary/coordinator election activity
    Election,
    /// Anything that does not fit the buckets above
    Other,
}

/// Severity levels for events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

/// Acknowledgement state, set only at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub by: String,
    pub at: DateTime<Utc>,
}

/// An immutable record of something that happened in a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub id: EventId,
    pub cluster_id: ClusterId,
    pub node_id: Option<NodeId>,
    /// Specific action tag, e.g. `cluster_created`, `node_status_changed`
    pub event_type: String,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub title: String,
    pub description: String,
    /// Structured context for the event
    pub details: serde_json::Value,
    /// Component or agent that recorded the event
    pub source_agent: String,
    pub source_node: Option<NodeId>,
    pub user: Option<String>,
    pub acknowledgement: Option<Acknowledgement>,
    /// Link to the event this one corrects or elaborates
    pub parent_event_id: Option<EventId>,
    /// Correlation ID for chaining related events
    pub correlation_id: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Draft of an event; `EventLog::append` assigns the id and timestamp
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub cluster_id: ClusterId,
    pub node_id: Option<NodeId>,
    pub event_type: String,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub title: String,
    pub description: String,
    pub details: serde_json::Value,
    pub source_agent: String,
    pub source_node: Option<NodeId>,
    pub user: Option<String>,
    pub parent_event_id: Option<EventId>,
    pub correlation_id: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

impl EventDraft {
    /// Create a draft with the required fields; everything else defaults.
    pub fn new(
        cluster_id: ClusterId,
        event_type: impl Into<String>,
        category: EventCategory,
        severity: EventSeverity,
        title: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id,
            node_id: None,
            event_type: event_type.into(),
            category,
            severity,
            title: title.into(),
            description: String::new(),
            details: serde_json::Value::Null,
            source_agent: "corral-core".to_string(),
            source_node: None,
            user: None,
            parent_event_id: None,
            correlation_id: None,
            tags: Vec::new(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_source_agent(mut self, source_agent: impl Into<String>) -> Self {
        self.source_agent = source_agent.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_parent(mut self, parent: EventId) -> Self {
        self.parent_event_id = Some(parent);
        self
    }
}

/// Filters for event queries
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub severity: Option<EventSeverity>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One page of a filtered, reverse-chronological event query
#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<ClusterEvent>,
    /// Total matching events before pagination
    pub total: usize,
}

/// Append-only event sink
pub struct EventLog {
    config: EventLogConfig,
    events: RwLock<Vec<Arc<ClusterEvent>>>,
}

impl EventLog {
    pub fn new(config: EventLogConfig) -> Self {
        Self {
            config,
            events: RwLock::new(Vec::new()),
        }
    }

    /// Append an event. Pure sink: always succeeds; referential validity of
    /// the cluster/node ids is the caller's responsibility.
    pub async fn append(&self, draft: EventDraft) -> EventId {
        let id = EventId(Uuid::new_v4());
        let event = ClusterEvent {
            id,
            cluster_id: draft.cluster_id,
            node_id: draft.node_id,
            event_type: draft.event_type,
            category: draft.category,
            severity: draft.severity,
            title: draft.title,
            description: draft.description,
            details: draft.details,
            source_agent: draft.source_agent,
            source_node: draft.source_node,
            user: draft.user,
            acknowledgement: None,
            parent_event_id: draft.parent_event_id,
            correlation_id: draft.correlation_id,
            tags: draft.tags,
            metadata: draft.metadata,
            created_at: Utc::now(),
            resolved_at: None,
        };
        debug!(
            event_type = %event.event_type,
            cluster_id = %event.cluster_id,
            "recorded cluster event"
        );
        self.events.write().await.push(Arc::new(event));
        id
    }

    /// Filtered, reverse-chronological page of a cluster's events plus the
    /// total match count.
    pub async fn events_for_cluster(
        &self,
        cluster_id: ClusterId,
        filter: &EventFilter,
    ) -> EventPage {
        let events = self.events.read().await;
        let matching: Vec<&Arc<ClusterEvent>> = events
            .iter()
            .rev()
            .filter(|e| e.cluster_id == cluster_id)
            .filter(|e| {
                filter
                    .event_type
                    .as_ref()
                    .map_or(true, |t| &e.event_type == t)
            })
            .filter(|e| filter.severity.map_or(true, |s| e.severity == s))
            .collect();

        let total = matching.len();
        let limit = filter.limit.unwrap_or(self.config.default_page_limit);
        let page = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .map(|e| e.as_ref().clone())
            .collect();

        EventPage {
            events: page,
            total,
        }
    }

    /// Number of events recorded so far, across all clusters.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(EventLogConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_id_and_timestamp() {
        let log = EventLog::default();
        let cluster_id = ClusterId::new();

        let id = log
            .append(
                EventDraft::new(
                    cluster_id,
                    "cluster_created",
                    EventCategory::Lifecycle,
                    EventSeverity::Info,
                    "Cluster created",
                )
                .with_description("Cluster 'edge-1' created in us-east"),
            )
            .await;

        let page = log
            .events_for_cluster(cluster_id, &EventFilter::default())
            .await;
        assert_eq!(page.total, 1);
        assert_eq!(page.events[0].id, id);
        assert_eq!(page.events[0].event_type, "cluster_created");
        assert!(page.events[0].acknowledgement.is_none());
    }

    #[tokio::test]
    async fn queries_filter_and_paginate_reverse_chronological() {
        let log = EventLog::default();
        let cluster_id = ClusterId::new();
        let other_cluster = ClusterId::new();

        for i in 0..5 {
            log.append(EventDraft::new(
                cluster_id,
                "node_status_changed",
                EventCategory::Health,
                EventSeverity::Info,
                format!("change {}", i),
            ))
            .await;
        }
        log.append(EventDraft::new(
            cluster_id,
            "cluster_decommissioned",
            EventCategory::Lifecycle,
            EventSeverity::Warning,
            "Cluster decommissioned",
        ))
        .await;
        log.append(EventDraft::new(
            other_cluster,
            "cluster_created",
            EventCategory::Lifecycle,
            EventSeverity::Info,
            "unrelated",
        ))
        .await;

        // Most recent first
        let page = log
            .events_for_cluster(cluster_id, &EventFilter::default())
            .await;
        assert_eq!(page.total, 6);
        assert_eq!(page.events[0].event_type, "cluster_decommissioned");

        // Type filter
        let page = log
            .events_for_cluster(
                cluster_id,
                &EventFilter {
                    event_type: Some("node_status_changed".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(page.total, 5);

        // Severity filter
        let page = log
            .events_for_cluster(
                cluster_id,
                &EventFilter {
                    severity: Some(EventSeverity::Warning),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(page.total, 1);

        // Pagination: limit 2, offset 1 of the 5 status changes
        let page = log
            .events_for_cluster(
                cluster_id,
                &EventFilter {
                    event_type: Some("node_status_changed".to_string()),
                    limit: Some(2),
                    offset: 1,
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(page.total, 5);
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].title, "change 3");
        assert_eq!(page.events[1].title, "change 2");
    }
}
