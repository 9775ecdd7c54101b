use tidepool::{Connectivity, NodeId, PartitionError, PartitionId, PartitionPlan, PlanViolation};

use super::{repartitions, running};

fn three_way() -> PartitionPlan {
    PartitionPlan::builder()
        .partition("p1", ["a"])
        .partition("p2", ["b"])
        .partition("p3", ["c"])
        .block("p1", "p2")
        .allow("p3", "p2")
        .default_connectivity(Connectivity::Blocked)
        .build()
        .expect("valid plan")
}

#[tokio::test(start_paused = true)]
async fn effective_connectivity_reproduces_the_plan() {
    let (network, _active, controller) = running(&["a", "b", "c"]).await;
    let plan = three_way();
    controller.apply(plan.clone()).await.expect("apply");

    let ids: Vec<PartitionId> = ["", "p1", "p2", "p3"].into_iter().map(PartitionId::new).collect();
    for a in &ids {
        for b in &ids {
            let expected = if a == b {
                Connectivity::Allowed
            } else {
                plan.connections()
                    .iter()
                    .find(|c| (&c.from == a && &c.to == b) || (&c.from == b && &c.to == a))
                    .map_or(plan.default_connectivity(), |c| c.connectivity)
            };
            assert_eq!(controller.effective_connectivity(a, b).await, expected, "{a} <-> {b}");
        }
    }

    assert!(!network.can_reach(&NodeId::new("a"), &NodeId::new("b")));
    assert!(network.can_reach(&NodeId::new("c"), &NodeId::new("b")));
    assert!(!network.can_reach(&NodeId::new("a"), &NodeId::new("c")));
    assert!(!network.can_reach(&NodeId::bootstrap(1), &NodeId::new("a")));
}

#[tokio::test(start_paused = true)]
async fn applying_twice_is_idempotent() {
    let (network, _active, controller) = running(&["a", "b", "c"]).await;
    controller.apply(three_way()).await.expect("first apply");
    let once = network.partitions();
    controller.apply(three_way()).await.expect("second apply");

    assert_eq!(network.partitions(), once);
    assert_eq!(controller.resolved().await, once);
    assert_eq!(repartitions(&network), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_plan_never_reaches_the_backend() {
    let (network, _active, controller) = running(&["a", "b"]).await;
    let plan: PartitionPlan =
        serde_json::from_str(r#"{ "partitions": { "p1": ["a", "b"], "p2": ["b"] } }"#).expect("parses");

    let err = controller.apply(plan).await.expect_err("b is in two partitions");
    assert!(matches!(
        err,
        PartitionError::Validation(PlanViolation::ServiceInMultiplePartitions { ref service, .. })
            if service == &NodeId::new("b")
    ));
    assert_eq!(repartitions(&network), 0);
    assert!(network.can_reach(&NodeId::new("a"), &NodeId::new("b")));
}
