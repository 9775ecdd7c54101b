use std::time::Duration;

use tidepool::sim::SimCallError;
use tidepool::{ConfirmationPoller, NodeId, PartitionPlan, PollError, ProbeError};

use super::{call_policy, running};

fn split(p1_p2_blocked: bool) -> PartitionPlan {
    let builder = PartitionPlan::builder().partition("P1", ["svc-a"]).partition("P2", ["svc-b"]);
    let builder = if p1_p2_blocked {
        builder.block("P1", "P2")
    } else {
        builder.allow("P1", "P2")
    };
    builder.build().expect("valid plan")
}

#[tokio::test(start_paused = true)]
async fn blocked_call_times_out_then_succeeds_after_heal() {
    let (_network, active, controller) = running(&["svc-a", "svc-b"]).await;
    let a = active.node(&NodeId::new("svc-a")).expect("svc-a").client().clone();
    let b = NodeId::new("svc-b");
    let poller = ConfirmationPoller::new();

    let reach_b = || {
        let a = a.clone();
        let b = b.clone();
        async move {
            match a.call(&b).await {
                Ok(()) => Ok(true),
                Err(err @ SimCallError::Unreachable { .. }) => Err(ProbeError::transient(err)),
                Err(err) => Err(ProbeError::fatal(err)),
            }
        }
    };

    controller.apply(split(true)).await.expect("apply blocked");
    let err = poller
        .await_condition("svc-a reaches svc-b", call_policy(), reach_b)
        .await
        .expect_err("partition blocks traffic");
    let PollError::Timeout {
        label,
        attempts,
        elapsed,
        last_error,
    } = &err
    else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(label, "svc-a reaches svc-b");
    assert_eq!(*attempts, 3);
    assert_eq!(*elapsed, Duration::from_secs(2));
    assert_eq!(last_error.as_deref(), Some("'svc-a' cannot reach 'svc-b'"));

    controller.apply(split(false)).await.expect("apply allowed");
    let outcome = poller
        .await_condition("svc-a reaches svc-b", call_policy(), reach_b)
        .await
        .expect("healed");
    assert!(outcome.attempts <= 2);
}

#[tokio::test(start_paused = true)]
async fn block_is_symmetric() {
    let (network, active, controller) = running(&["svc-a", "svc-b"]).await;
    controller.apply(split(true)).await.expect("apply blocked");

    let a = active.node(&NodeId::new("svc-a")).expect("svc-a");
    let b = active.node(&NodeId::new("svc-b")).expect("svc-b");
    assert!(a.client().call(b.id()).await.is_err());
    assert!(b.client().call(a.id()).await.is_err());
    // the bootstrap node sits in the default partition, which stays connected
    assert!(a.client().call(&NodeId::bootstrap(1)).await.is_ok());
    assert!(network.can_reach(&NodeId::bootstrap(1), b.id()));
}

#[tokio::test(start_paused = true)]
async fn heal_reconnects_every_partition() {
    let (network, active, controller) = running(&["svc-a", "svc-b"]).await;
    controller.apply(split(true)).await.expect("apply blocked");
    controller.heal().await.expect("heal");

    let a = active.node(&NodeId::new("svc-a")).expect("svc-a");
    a.client().call(&NodeId::new("svc-b")).await.expect("healed network");
    assert_eq!(controller.current().await, PartitionPlan::unpartitioned());
    assert!(network.partitions().members().is_empty());
}
