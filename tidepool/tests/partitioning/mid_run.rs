use tidepool::sim::SimEventKind;
use tidepool::{
    NodeId, NodeSpec, OrchestrationError, PartitionError, PartitionId, PartitionPlan, PlanViolation, StartupParams,
};

use super::{repartitions, running};

fn api_and_datastore() -> PartitionPlan {
    PartitionPlan::builder()
        .partition("api", ["api-1"])
        .partition("datastore", ["datastore"])
        .block("api", "datastore")
        .build()
        .expect("valid plan")
}

fn api_spec(id: &str) -> NodeSpec {
    NodeSpec::dependent(id, StartupParams::new("node:test").with_peers(vec![NodeId::bootstrap(1)]))
}

#[tokio::test(start_paused = true)]
async fn node_added_mid_run_joins_default_partition_then_moves() {
    let (network, mut active, controller) = running(&["svc-a", "svc-b"]).await;
    controller
        .apply(
            PartitionPlan::builder()
                .partition("P1", ["svc-a"])
                .partition("P2", ["svc-b"])
                .block("P1", "P2")
                .build()
                .expect("valid plan"),
        )
        .await
        .expect("apply");

    let late = NodeId::new("svc-c");
    let params = StartupParams::new("node:test").with_peers(vec![NodeId::bootstrap(1)]);
    active
        .add_node(NodeSpec::dependent(late.clone(), params))
        .await
        .expect("node added");

    let resolved = controller.resolved().await;
    assert!(resolved.partition_of(&late).is_default());
    assert!(network.can_reach(&late, &NodeId::new("svc-a")));
    assert!(network.can_reach(&late, &NodeId::new("svc-b")));

    controller
        .add_to_partition(late.clone(), &PartitionId::new("P2"))
        .await
        .expect("moved into P2");

    let c = active.node(&late).expect("svc-c");
    assert!(c.client().call(&NodeId::new("svc-a")).await.is_err());
    c.client().call(&NodeId::new("svc-b")).await.expect("same partition");
    assert_eq!(controller.resolved().await.partition_of(&late), &PartitionId::new("P2"));
}

#[tokio::test(start_paused = true)]
async fn node_added_into_partition_is_isolated_from_the_start() {
    let (network, mut active, controller) = running(&["api-1", "datastore"]).await;
    controller.apply(api_and_datastore()).await.expect("apply");
    network.ready_after("api-2", 3);

    let api = PartitionId::new("api");
    active
        .add_node_to_partition(api_spec("api-2"), &api, &controller)
        .await
        .expect("node added");

    // membership is enforced before the node is created
    let events = network.events();
    let created = events
        .iter()
        .position(|e| matches!(&e.kind, SimEventKind::Created { node, .. } if node.as_str() == "api-2"))
        .expect("api-2 created");
    let assigned = events
        .iter()
        .rposition(|e| e.kind == SimEventKind::Repartitioned)
        .expect("repartitioned");
    assert!(assigned < created);
    assert_eq!(controller.resolved().await.partition_of(&NodeId::new("api-2")), &api);

    let api2 = active.node(&NodeId::new("api-2")).expect("api-2");
    assert!(api2.client().call(&NodeId::new("datastore")).await.is_err());
    api2.client().call(&NodeId::new("api-1")).await.expect("same partition");

    controller.heal().await.expect("heal");
    api2.client().call(&NodeId::new("datastore")).await.expect("healed");
}

#[tokio::test(start_paused = true)]
async fn undeclared_partition_is_rejected_before_creation() {
    let (network, mut active, controller) = running(&["api-1", "datastore"]).await;
    controller.apply(api_and_datastore()).await.expect("apply");

    let err = active
        .add_node_to_partition(api_spec("api-2"), &PartitionId::new("cache"), &controller)
        .await
        .expect_err("cache is not declared");

    assert!(matches!(
        err,
        OrchestrationError::Partition(PartitionError::Validation(PlanViolation::UnknownPartition(_)))
    ));
    assert!(!network.is_running(&NodeId::new("api-2")));
    assert_eq!(repartitions(&network), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_creation_releases_partition_membership() {
    let (network, mut active, controller) = running(&["api-1", "datastore"]).await;
    controller.apply(api_and_datastore()).await.expect("apply");
    network.fail_creation("api-2");

    let err = active
        .add_node_to_partition(api_spec("api-2"), &PartitionId::new("api"), &controller)
        .await
        .expect_err("creation refused");

    assert!(matches!(err, OrchestrationError::NodeCreationFailed { .. }));
    assert!(active.node(&NodeId::new("api-2")).is_none());
    assert!(controller.resolved().await.partition_of(&NodeId::new("api-2")).is_default());
    assert_eq!(controller.current().await, api_and_datastore());
}
