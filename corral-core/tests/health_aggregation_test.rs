use corral_core::cluster_registry::{ClusterInfo, CreateClusterRequest};
use corral_core::manager::ClusterManager;
use corral_core::node_registry::AddNodeRequest;
use corral_core::types::{ClusterStatus, MetricsUpdate, NodeHealth, NodeStatus};
use pretty_assertions::assert_eq;

async fn cluster_snapshot(
    manager: &ClusterManager,
    cluster_id: &str,
) -> corral_core::types::Cluster {
    match manager.get_cluster_info(Some(cluster_id)).await.unwrap() {
        ClusterInfo::One(detail) => detail.cluster,
        ClusterInfo::All(_) => panic!("expected a single-cluster view"),
    }
}

#[tokio::test]
async fn health_check_timestamp_advances_on_every_mutation() {
    let manager = ClusterManager::new();
    let cluster = manager
        .create_cluster(CreateClusterRequest::new("edge-1", "us-east"))
        .await
        .unwrap();

    let node = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n1", "us-east"))
        .await
        .unwrap();
    let after_add = cluster_snapshot(&manager, &cluster.cluster_id)
        .await
        .last_health_check
        .expect("add_node must recompute health");

    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    manager
        .update_node_status(&node.node_id, NodeStatus::Online, Some(NodeHealth::Healthy), None)
        .await
        .unwrap();
    let after_report = cluster_snapshot(&manager, &cluster.cluster_id)
        .await
        .last_health_check
        .unwrap();
    assert!(after_report > after_add);

    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    manager.promote_to_primary(&node.node_id).await.unwrap();
    let after_promote = cluster_snapshot(&manager, &cluster.cluster_id)
        .await
        .last_health_check
        .unwrap();
    assert!(after_promote > after_report);

    // An unchanged heartbeat emits no event but still refreshes the score.
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    manager
        .update_node_status(&node.node_id, NodeStatus::Online, Some(NodeHealth::Healthy), None)
        .await
        .unwrap();
    let after_heartbeat = cluster_snapshot(&manager, &cluster.cluster_id)
        .await
        .last_health_check
        .unwrap();
    assert!(after_heartbeat > after_promote);
}

#[tokio::test]
async fn score_reflects_online_and_healthy_fractions() {
    let manager = ClusterManager::new();
    let cluster = manager
        .create_cluster(CreateClusterRequest::new("edge-1", "us-east"))
        .await
        .unwrap();

    let n1 = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n1", "us-east"))
        .await
        .unwrap();
    let n2 = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n2", "us-east"))
        .await
        .unwrap();

    // Nothing online yet: both fractions zero, penalties clamp to zero.
    let snapshot = cluster_snapshot(&manager, &cluster.cluster_id).await;
    assert_eq!(snapshot.health_score, 0.0);
    assert_eq!(snapshot.status, ClusterStatus::Initializing);

    manager
        .update_node_status(&n1.node_id, NodeStatus::Online, Some(NodeHealth::Healthy), None)
        .await
        .unwrap();
    manager
        .update_node_status(&n2.node_id, NodeStatus::Online, Some(NodeHealth::Healthy), None)
        .await
        .unwrap();
    manager.promote_to_primary(&n1.node_id).await.unwrap();
    manager.promote_to_coordinator(&n2.node_id).await.unwrap();

    // All online and healthy with both roles held: a perfect score.
    let snapshot = cluster_snapshot(&manager, &cluster.cluster_id).await;
    assert!((snapshot.health_score - 1.0).abs() < 1e-9);
    assert_eq!(snapshot.status, ClusterStatus::Active);

    // One node degrading to critical halves the healthy fraction.
    manager
        .update_node_status(&n2.node_id, NodeStatus::Online, Some(NodeHealth::Critical), None)
        .await
        .unwrap();
    let snapshot = cluster_snapshot(&manager, &cluster.cluster_id).await;
    assert!((snapshot.health_score - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn cluster_flips_between_active_and_degraded() {
    let manager = ClusterManager::new();
    let cluster = manager
        .create_cluster(CreateClusterRequest::new("edge-1", "us-east"))
        .await
        .unwrap();

    let n1 = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n1", "us-east"))
        .await
        .unwrap();
    let n2 = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n2", "us-east"))
        .await
        .unwrap();

    for node in [&n1, &n2] {
        manager
            .update_node_status(&node.node_id, NodeStatus::Online, Some(NodeHealth::Healthy), None)
            .await
            .unwrap();
    }
    manager.promote_to_primary(&n1.node_id).await.unwrap();
    manager.promote_to_coordinator(&n1.node_id).await.unwrap();
    assert_eq!(
        cluster_snapshot(&manager, &cluster.cluster_id).await.status,
        ClusterStatus::Active
    );

    // Taking the role holder offline clears its flags, so the score lands
    // at 0.3 (online) + 0.4 (healthy) - 0.2 (vacant roles) = 0.5.
    manager
        .update_node_status(&n1.node_id, NodeStatus::Offline, Some(NodeHealth::Critical), None)
        .await
        .unwrap();
    let snapshot = cluster_snapshot(&manager, &cluster.cluster_id).await;
    assert_eq!(snapshot.status, ClusterStatus::Degraded);
    assert!(snapshot.health_score < 0.7);

    // Recovery flips it back.
    manager
        .update_node_status(&n1.node_id, NodeStatus::Online, Some(NodeHealth::Healthy), None)
        .await
        .unwrap();
    manager.promote_to_primary(&n1.node_id).await.unwrap();
    manager.promote_to_coordinator(&n1.node_id).await.unwrap();
    let snapshot = cluster_snapshot(&manager, &cluster.cluster_id).await;
    assert_eq!(snapshot.status, ClusterStatus::Active);
    assert!(snapshot.health_score >= 0.7);
}

#[tokio::test]
async fn health_summary_buckets_and_recommendations() {
    let manager = ClusterManager::new();
    let cluster = manager
        .create_cluster(CreateClusterRequest::new("edge-1", "us-east"))
        .await
        .unwrap();

    let n1 = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n1", "us-east"))
        .await
        .unwrap();
    let n2 = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n2", "us-east"))
        .await
        .unwrap();
    manager
        .update_node_status(&n1.node_id, NodeStatus::Online, Some(NodeHealth::Healthy), None)
        .await
        .unwrap();
    manager
        .update_node_status(&n2.node_id, NodeStatus::Offline, Some(NodeHealth::Warning), None)
        .await
        .unwrap();

    let summary = manager
        .get_cluster_health_summary(Some(&cluster.cluster_id))
        .await
        .unwrap()
        .remove(0);

    assert_eq!(summary.nodes_by_status.online, 1);
    assert_eq!(summary.nodes_by_status.offline, 1);
    assert_eq!(summary.nodes_by_health.healthy, 1);
    assert_eq!(summary.nodes_by_health.warning, 1);
    assert!(!summary.has_primary);
    assert!(!summary.has_coordinator);
    // Score is below threshold and both roles are vacant.
    assert_eq!(summary.recommendations.len(), 3);

    // The unscoped call returns one summary per cluster.
    manager
        .create_cluster(CreateClusterRequest::new("edge-2", "eu-west"))
        .await
        .unwrap();
    let all = manager.get_cluster_health_summary(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let empty = all.iter().find(|s| s.name == "edge-2").unwrap();
    assert!(empty
        .recommendations
        .iter()
        .any(|r| r.contains("No online nodes")));
}

#[tokio::test]
async fn heartbeat_merges_metrics_and_tracks_uptime() {
    let manager = ClusterManager::new();
    let cluster = manager
        .create_cluster(CreateClusterRequest::new("edge-1", "us-east"))
        .await
        .unwrap();
    let node = manager
        .add_cluster_node(AddNodeRequest::new(&cluster.cluster_id, "n1", "us-east"))
        .await
        .unwrap();

    manager
        .update_node_status(
            &node.node_id,
            NodeStatus::Online,
            Some(NodeHealth::Healthy),
            Some(MetricsUpdate {
                cpu_usage_percent: Some(35.0),
                load_average: Some(0.8),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    // Second heartbeat only updates disk; cpu and load stay.
    let report = manager
        .update_node_status(
            &node.node_id,
            NodeStatus::Online,
            None,
            Some(MetricsUpdate {
                disk_usage_percent: Some(55.0),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    assert!(!report.status_changed);

    match manager.get_cluster_info(Some(&cluster.cluster_id)).await.unwrap() {
        ClusterInfo::One(detail) => {
            let n = &detail.nodes[0];
            assert_eq!(n.metrics.cpu_usage_percent, 35.0);
            assert_eq!(n.metrics.load_average, 0.8);
            assert_eq!(n.metrics.disk_usage_percent, 55.0);
            assert!(n.last_heartbeat.is_some());
            assert!(n.last_restart.is_some());
        }
        ClusterInfo::All(_) => panic!("expected a single-cluster view"),
    }
}
