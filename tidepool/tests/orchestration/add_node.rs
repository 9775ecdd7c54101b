use std::time::Duration;

use tidepool::sim::SimNetwork;
use tidepool::{NodeId, NodeSetError, NodeSpec, OrchestrationError, StartupParams};

use super::{node_set, orchestrator, IMAGE};

#[tokio::test(start_paused = true)]
async fn add_node_creates_and_waits_for_a_new_node() {
    let network = SimNetwork::new();
    network.ready_after("late", 2);
    let mut active = orchestrator(&network, 5, Duration::from_secs(1))
        .bring_up(node_set(2, &[]))
        .await
        .expect("bring-up succeeds");

    let params = StartupParams::new(IMAGE).with_peers(vec![NodeId::bootstrap(1)]);
    let node = active
        .add_node(NodeSpec::dependent("late", params))
        .await
        .expect("node added");
    assert_eq!(node.id(), &NodeId::new("late"));

    assert_eq!(active.len(), 3);
    assert_eq!(active.report().total_retries(), 1);
    assert!(active.node(&NodeId::new("late")).is_some());
}

#[tokio::test(start_paused = true)]
async fn add_node_rejects_conflicting_declarations() {
    let network = SimNetwork::new();
    let mut active = orchestrator(&network, 5, Duration::from_secs(1))
        .bring_up(node_set(1, &["worker"]))
        .await
        .expect("bring-up succeeds");

    let err = active
        .add_node(NodeSpec::dependent("worker", StartupParams::new(IMAGE)))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, OrchestrationError::InvalidNode(NodeSetError::DuplicateNode(_))));

    let params = StartupParams::new(IMAGE).with_peers(vec![NodeId::new("ghost")]);
    let err = active
        .add_node(NodeSpec::dependent("late", params))
        .await
        .expect_err("unknown peer");
    assert!(matches!(err, OrchestrationError::InvalidNode(NodeSetError::UnknownPeer { .. })));

    assert!(!network.is_running(&NodeId::new("late")));
    assert_eq!(active.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_addition_leaves_network_unchanged() {
    let network = SimNetwork::new();
    network.never_ready("late");
    let mut active = orchestrator(&network, 3, Duration::from_secs(1))
        .bring_up(node_set(1, &[]))
        .await
        .expect("bring-up succeeds");

    let err = active
        .add_node(NodeSpec::dependent("late", StartupParams::new(IMAGE)))
        .await
        .expect_err("never ready");
    assert!(matches!(err, OrchestrationError::ReadinessTimeout { .. }));
    assert!(active.node(&NodeId::new("late")).is_none());
    assert_eq!(active.report().len(), 1);
}
