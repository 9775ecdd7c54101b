use std::time::Duration;

use tidepool::sim::{SimEventKind, SimNetwork};
use tidepool::NodeId;

use super::{created_at, node_set, orchestrator, ready_at};

#[tokio::test(start_paused = true)]
async fn three_bootstrap_two_dependent_all_healthy() {
    let network = SimNetwork::new();
    let active = orchestrator(&network, 5, Duration::from_millis(100))
        .bring_up(node_set(3, &["worker-1", "worker-2"]))
        .await
        .expect("bring-up succeeds");

    assert_eq!(active.len(), 5);
    assert_eq!(active.report().len(), 5);
    assert_eq!(active.report().total_retries(), 0);
    for node in active.nodes() {
        assert_eq!(network.address_of(node.id()), Some(node.address()));
        assert_eq!(active.report().readiness(node.id()).map(|o| o.attempts), Some(1));
    }
}

#[tokio::test(start_paused = true)]
async fn bootstrap_nodes_are_created_in_index_order_with_chained_peers() {
    let network = SimNetwork::new();
    orchestrator(&network, 5, Duration::from_millis(100))
        .bring_up(node_set(3, &["worker"]))
        .await
        .expect("bring-up succeeds");

    let created = network.created();
    assert_eq!(&created[..3], &[NodeId::bootstrap(1), NodeId::bootstrap(2), NodeId::bootstrap(3)]);

    let peers: Vec<Vec<NodeId>> = network
        .events()
        .into_iter()
        .filter_map(|event| match event.kind {
            SimEventKind::Created { peers, .. } => Some(peers),
            _ => None,
        })
        .collect();
    assert!(peers[0].is_empty());
    assert_eq!(peers[1], vec![NodeId::bootstrap(1)]);
    assert_eq!(peers[2], vec![NodeId::bootstrap(1), NodeId::bootstrap(2)]);
    assert_eq!(peers[3], vec![NodeId::bootstrap(1), NodeId::bootstrap(2), NodeId::bootstrap(3)]);
}

#[tokio::test(start_paused = true)]
async fn no_dependent_starts_before_every_bootstrap_node_is_ready() {
    let network = SimNetwork::new();
    network.ready_after(NodeId::bootstrap(1), 2);
    network.ready_after(NodeId::bootstrap(2), 4);
    network.ready_after(NodeId::bootstrap(3), 3);

    let active = orchestrator(&network, 10, Duration::from_secs(1))
        .bring_up(node_set(3, &["worker-1", "worker-2"]))
        .await
        .expect("bring-up succeeds");

    let last_bootstrap_ready = (1..=3)
        .filter_map(|i| ready_at(&network, &NodeId::bootstrap(i)))
        .max()
        .expect("bootstrap nodes probed");
    assert_eq!(last_bootstrap_ready, Duration::from_secs(3));

    for worker in ["worker-1", "worker-2"] {
        let created = created_at(&network, &NodeId::new(worker)).expect("worker created");
        assert!(created >= last_bootstrap_ready, "{worker} created at {created:?}");
    }
    // bootstrap nodes are waited on concurrently: 1 + 3 + 2 retries
    assert_eq!(active.report().total_retries(), 6);
}

#[tokio::test(start_paused = true)]
async fn dependents_wait_for_readiness_independently() {
    let network = SimNetwork::new();
    network.ready_after("slow", 5);

    let active = orchestrator(&network, 10, Duration::from_secs(1))
        .bring_up(node_set(1, &["fast", "slow"]))
        .await
        .expect("bring-up succeeds");

    let fast = ready_at(&network, &NodeId::new("fast")).expect("fast ready");
    let slow = ready_at(&network, &NodeId::new("slow")).expect("slow ready");
    assert_eq!(fast, Duration::ZERO);
    assert_eq!(slow, Duration::from_secs(4));
    assert_eq!(active.report().readiness(&NodeId::new("slow")).map(|o| o.retries()), Some(4));
}
