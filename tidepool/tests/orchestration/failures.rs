use std::time::Duration;

use tidepool::sim::SimNetwork;
use tidepool::{NodeId, OrchestrationError, PollError, ProbeError};
use tokio_util::sync::CancellationToken;

use super::{node_set, orchestrator};

#[tokio::test(start_paused = true)]
async fn unready_bootstrap_node_fails_within_budget_and_blocks_dependents() {
    let network = SimNetwork::new();
    network.never_ready(NodeId::bootstrap(2));

    let start = tokio::time::Instant::now();
    let err = orchestrator(&network, 4, Duration::from_secs(1))
        .bring_up(node_set(3, &["worker"]))
        .await
        .expect_err("bootstrap node never ready");
    let elapsed = start.elapsed();

    let OrchestrationError::ReadinessTimeout { node, source } = &err else {
        panic!("expected readiness timeout, got {err:?}");
    };
    assert_eq!(node, &NodeId::bootstrap(2));
    assert!(source.is_timeout());
    assert_eq!(source.attempts(), 4);
    // three sleeps between four attempts
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4), "{elapsed:?}");

    assert!(!network.is_running(&NodeId::new("worker")));
    assert_eq!(network.probe_count(&NodeId::bootstrap(2)), 4);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_creation_failure_stops_the_sequence() {
    let network = SimNetwork::new();
    network.fail_creation(NodeId::bootstrap(2));

    let err = orchestrator(&network, 3, Duration::from_millis(10))
        .bring_up(node_set(3, &["worker"]))
        .await
        .expect_err("creation refused");

    assert!(matches!(
        &err,
        OrchestrationError::NodeCreationFailed { node, .. } if node == &NodeId::bootstrap(2)
    ));
    assert!(err.to_string().contains("refused"));
    assert_eq!(network.created(), vec![NodeId::bootstrap(1)]);
}

#[tokio::test(start_paused = true)]
async fn dependent_creation_failure_fails_bring_up() {
    let network = SimNetwork::new();
    network.fail_creation("worker-2");

    let err = orchestrator(&network, 3, Duration::from_millis(10))
        .bring_up(node_set(2, &["worker-1", "worker-2"]))
        .await
        .expect_err("creation refused");

    assert_eq!(err.node(), Some(&NodeId::new("worker-2")));
    assert!(matches!(err, OrchestrationError::NodeCreationFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn unready_dependent_fails_bring_up() {
    let network = SimNetwork::new();
    network.never_ready("worker");

    let err = orchestrator(&network, 2, Duration::from_secs(1))
        .bring_up(node_set(1, &["worker"]))
        .await
        .expect_err("dependent never ready");

    assert!(matches!(
        err,
        OrchestrationError::ReadinessTimeout { ref node, .. } if node == &NodeId::new("worker")
    ));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_a_long_readiness_wait() {
    let network = SimNetwork::new();
    network.never_ready(NodeId::bootstrap(1));
    let token = CancellationToken::new();

    let orchestrator = orchestrator(&network, 30, Duration::from_secs(5)).with_cancellation(token.clone());
    let start = tokio::time::Instant::now();
    let (result, ()) = tokio::join!(orchestrator.bring_up(node_set(1, &[])), async {
        tokio::time::sleep(Duration::from_secs(7)).await;
        token.cancel();
    });

    let err = result.expect_err("cancelled");
    let OrchestrationError::Cancelled { node, source } = &err else {
        panic!("expected cancellation, got {err:?}");
    };
    assert_eq!(node, &NodeId::bootstrap(1));
    assert!(matches!(source, PollError::Cancelled { attempts: 2, .. }));
    assert_eq!(start.elapsed(), Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn hung_readiness_check_is_bounded_by_configured_timeout() {
    let network = SimNetwork::new();
    network.hang(NodeId::bootstrap(1));

    let start = tokio::time::Instant::now();
    let err = orchestrator(&network, 2, Duration::from_secs(1))
        .with_probe_timeout(Duration::from_secs(1))
        .bring_up(node_set(1, &[]))
        .await
        .expect_err("probe never answers");

    assert!(matches!(err, OrchestrationError::ReadinessTimeout { .. }));
    assert_eq!(network.probe_count(&NodeId::bootstrap(1)), 2);
    // two attempt timeouts plus one sleep between them
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn permanent_readiness_failure_is_not_reported_as_timeout() {
    let network = SimNetwork::new();
    network.crash_on_probe(NodeId::bootstrap(1));

    let start = tokio::time::Instant::now();
    let err = orchestrator(&network, 5, Duration::from_secs(1))
        .bring_up(node_set(1, &["worker"]))
        .await
        .expect_err("probe fails permanently");

    let OrchestrationError::ReadinessFailed { node, source } = &err else {
        panic!("expected readiness failure, got {err:?}");
    };
    assert_eq!(node, &NodeId::bootstrap(1));
    assert!(matches!(
        source,
        PollError::Fatal { attempt: 1, source: ProbeError::Fatal(message), .. } if message.contains("crashed")
    ));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(!network.is_running(&NodeId::new("worker")));
}

#[tokio::test(start_paused = true)]
async fn hung_readiness_check_is_bounded_by_default_timeout() {
    let network = SimNetwork::new();
    network.hang(NodeId::bootstrap(1));

    let start = tokio::time::Instant::now();
    let err = orchestrator(&network, 2, Duration::from_secs(1))
        .bring_up(node_set(1, &[]))
        .await
        .expect_err("probe never answers");

    assert!(matches!(err, OrchestrationError::ReadinessTimeout { .. }));
    assert_eq!(start.elapsed(), tidepool::DEFAULT_PROBE_TIMEOUT * 2 + Duration::from_secs(1));
}
