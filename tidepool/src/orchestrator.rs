//! Two-phase network bring-up.
//!
//! [`NetworkOrchestrator`] is the declared network; [`bring_up`] consumes it
//! and returns an [`ActiveNetwork`]. Bring-up therefore happens at most once
//! per orchestrator, and run-phase operations only exist on the active
//! handle.
//!
//! # Ordering
//!
//! ```text
//!  create b1 → create b2 → … → create bN        (ascending bootstrap index)
//!        ╰──── wait ready b1 ‖ b2 ‖ … ‖ bN ────╯  (concurrent, all-or-nothing)
//!  ════════════════ phase barrier ════════════════
//!  create d1 → wait d1  ‖  create d2 → wait d2  ‖ …
//! ```
//!
//! No dependent node is created before every bootstrap node passed its
//! readiness check. Any creation or readiness failure aborts the whole
//! bring-up; nodes created so far are dropped.
//!
//! [`bring_up`]: NetworkOrchestrator::bring_up

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::try_join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::node::{BoxError, NodeFactory, NodeSet, NodeSetError, NodeSpec, RunningNode};
use crate::poll::{HealthChecker, PollError, PollOutcome, DEFAULT_PROBE_TIMEOUT};
use crate::partition::{PartitionBackend, PartitionController, PartitionError};
use crate::{NodeId, PartitionId, RetryPolicy, TimeProvider, TokioTimeProvider};

/// Errors from bringing up or extending a network.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The factory could not provision a node.
    #[error("failed to create node '{node}': {cause}")]
    NodeCreationFailed {
        /// Node being created.
        node: NodeId,
        /// Factory error.
        #[source]
        cause: BoxError,
    },

    /// A node never passed its readiness check.
    #[error("node '{node}' did not become ready: {source}")]
    ReadinessTimeout {
        /// Node being waited on.
        node: NodeId,
        /// Poll failure with attempt count and elapsed time.
        #[source]
        source: PollError,
    },

    /// A readiness probe reported a non-retryable failure.
    #[error("readiness check of node '{node}' failed: {source}")]
    ReadinessFailed {
        /// Node being checked.
        node: NodeId,
        /// Poll failure naming the attempt and the probe error.
        #[source]
        source: PollError,
    },

    /// The surrounding test cancelled a readiness wait.
    #[error("bring-up cancelled while waiting for node '{node}'")]
    Cancelled {
        /// Node being waited on.
        node: NodeId,
        /// Poll failure with attempt count and elapsed time.
        #[source]
        source: PollError,
    },

    /// A node added to a running network conflicts with it.
    #[error("invalid node declaration: {0}")]
    InvalidNode(#[from] NodeSetError),

    /// A new node could not be placed in its partition.
    #[error("failed to assign partition: {0}")]
    Partition(#[from] PartitionError),
}

impl OrchestrationError {
    /// Node the failure is about, if any.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::NodeCreationFailed { node, .. }
            | Self::ReadinessTimeout { node, .. }
            | Self::ReadinessFailed { node, .. }
            | Self::Cancelled { node, .. } => Some(node),
            Self::InvalidNode(_) | Self::Partition(_) => None,
        }
    }
}

/// Readiness outcomes recorded during bring-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BringUpReport {
    readiness: BTreeMap<NodeId, PollOutcome>,
}

impl BringUpReport {
    /// Readiness outcome of one node.
    pub fn readiness(&self, node: &NodeId) -> Option<&PollOutcome> {
        self.readiness.get(node)
    }

    /// Failed readiness attempts across all nodes.
    pub fn total_retries(&self) -> u32 {
        self.readiness.values().map(PollOutcome::retries).sum()
    }

    /// Number of nodes that passed readiness.
    pub fn len(&self) -> usize {
        self.readiness.len()
    }

    /// Whether no node has been recorded.
    pub fn is_empty(&self) -> bool {
        self.readiness.is_empty()
    }
}

/// A declared, not yet started, network.
pub struct NetworkOrchestrator<F: NodeFactory, T: TimeProvider = TokioTimeProvider> {
    factory: F,
    time: T,
    health_policy: RetryPolicy,
    probe_timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl<F: NodeFactory> NetworkOrchestrator<F> {
    /// Orchestrator using `factory`, Tokio time, and
    /// [`RetryPolicy::node_startup`] for readiness.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            time: TokioTimeProvider::new(),
            health_policy: RetryPolicy::node_startup(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            cancel: None,
        }
    }
}

impl<F: NodeFactory, T: TimeProvider> NetworkOrchestrator<F, T> {
    /// Use a different time provider.
    pub fn with_time<U: TimeProvider>(self, time: U) -> NetworkOrchestrator<F, U> {
        NetworkOrchestrator {
            factory: self.factory,
            time,
            health_policy: self.health_policy,
            probe_timeout: self.probe_timeout,
            cancel: self.cancel,
        }
    }

    /// Retry budget for every readiness check.
    pub fn with_health_policy(mut self, policy: RetryPolicy) -> Self {
        self.health_policy = policy;
        self
    }

    /// Count a liveness probe hanging longer than `limit` as not ready.
    ///
    /// Defaults to [`DEFAULT_PROBE_TIMEOUT`].
    pub fn with_probe_timeout(mut self, limit: Duration) -> Self {
        self.probe_timeout = limit;
        self
    }

    /// Abort readiness waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Create every node in `nodes`, bootstrap nodes first, and wait for each
    /// to become ready.
    ///
    /// On success every returned node has already passed its readiness probe.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::NodeCreationFailed`] as soon as the factory fails,
    /// [`OrchestrationError::ReadinessTimeout`] when a node exhausts the
    /// health policy, [`OrchestrationError::ReadinessFailed`] when a probe
    /// fails permanently, [`OrchestrationError::Cancelled`] when the cancellation
    /// token fires. No partial topology is returned.
    pub async fn bring_up(self, nodes: NodeSet) -> Result<ActiveNetwork<F, T>, OrchestrationError> {
        let span = tracing::info_span!(
            "bring_up",
            bootstrap = nodes.bootstrap_nodes().len(),
            dependent = nodes.dependent_nodes().len()
        );
        async move {
            let this = &self;
            let mut running = BTreeMap::new();
            let mut report = BringUpReport::default();

            tracing::info!("launching bootstrap nodes");
            let mut bootstrap = Vec::with_capacity(nodes.bootstrap_nodes().len());
            for spec in nodes.bootstrap_nodes() {
                bootstrap.push(this.create(spec).await?);
            }

            tracing::info!("waiting for bootstrap nodes to become available");
            let outcomes = try_join_all(bootstrap.iter().map(|node| this.await_ready(node))).await?;
            for (node, outcome) in bootstrap.into_iter().zip(outcomes) {
                report.readiness.insert(node.id().clone(), outcome);
                running.insert(node.id().clone(), node);
            }
            tracing::info!("bootstrap nodes available");

            tracing::info!("launching dependent nodes");
            let dependents = try_join_all(nodes.dependent_nodes().iter().map(|spec| async move {
                let node = this.create(spec).await?;
                let outcome = this.await_ready(&node).await?;
                Ok::<_, OrchestrationError>((node, outcome))
            }))
            .await?;
            for (node, outcome) in dependents {
                report.readiness.insert(node.id().clone(), outcome);
                running.insert(node.id().clone(), node);
            }
            tracing::info!(nodes = running.len(), "network available");

            Ok(ActiveNetwork {
                orchestrator: self,
                nodes: running,
                report,
            })
        }
        .instrument(span)
        .await
    }

    async fn create(&self, spec: &NodeSpec) -> Result<RunningNode<F::Client>, OrchestrationError> {
        let node = self
            .factory
            .create(spec)
            .await
            .map_err(|cause| {
                tracing::error!(node = %spec.id(), error = %cause, "node creation failed");
                OrchestrationError::NodeCreationFailed {
                    node: spec.id().clone(),
                    cause,
                }
            })?;
        tracing::debug!(node = %spec.id(), address = %node.address(), "node created");
        Ok(node)
    }

    async fn await_ready(&self, node: &RunningNode<F::Client>) -> Result<PollOutcome, OrchestrationError> {
        let mut checker = HealthChecker::new(node.id().clone(), node.probe())
            .with_time(self.time.clone())
            .with_probe_timeout(self.probe_timeout);
        if let Some(token) = &self.cancel {
            checker = checker.with_cancellation(token.clone());
        }

        match checker.wait_for_startup(self.health_policy).await {
            Ok(outcome) => {
                tracing::debug!(node = %node.id(), attempts = outcome.attempts, "node ready");
                Ok(outcome)
            }
            Err(source @ PollError::Cancelled { .. }) => Err(OrchestrationError::Cancelled {
                node: node.id().clone(),
                source,
            }),
            Err(source @ PollError::Timeout { .. }) => {
                tracing::error!(node = %node.id(), error = %source, "node never became ready");
                Err(OrchestrationError::ReadinessTimeout {
                    node: node.id().clone(),
                    source,
                })
            }
            Err(source @ PollError::Fatal { .. }) => {
                tracing::error!(node = %node.id(), error = %source, "readiness probe failed permanently");
                Err(OrchestrationError::ReadinessFailed {
                    node: node.id().clone(),
                    source,
                })
            }
        }
    }
}

impl<F: NodeFactory, T: TimeProvider> std::fmt::Debug for NetworkOrchestrator<F, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkOrchestrator")
            .field("health_policy", &self.health_policy)
            .finish_non_exhaustive()
    }
}

/// A network whose nodes have all passed readiness.
///
/// Node handles are read-only; the map only grows through
/// [`add_node`](Self::add_node).
pub struct ActiveNetwork<F: NodeFactory, T: TimeProvider = TokioTimeProvider> {
    orchestrator: NetworkOrchestrator<F, T>,
    nodes: BTreeMap<NodeId, RunningNode<F::Client>>,
    report: BringUpReport,
}

impl<F: NodeFactory, T: TimeProvider> ActiveNetwork<F, T> {
    /// Look up a node.
    pub fn node(&self, id: &NodeId) -> Option<&RunningNode<F::Client>> {
        self.nodes.get(id)
    }

    /// All nodes, ordered by ID.
    pub fn nodes(&self) -> impl Iterator<Item = &RunningNode<F::Client>> {
        self.nodes.values()
    }

    /// Node IDs, ordered.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Number of running nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the network has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Readiness outcomes of every node.
    pub fn report(&self) -> &BringUpReport {
        &self.report
    }

    /// Create one more node in the running network and wait for it.
    ///
    /// The node joins whatever partition currently holds unassigned services;
    /// use [`add_node_to_partition`](Self::add_node_to_partition) to place it
    /// elsewhere from the start.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::InvalidNode`] when the ID is taken, a peer is
    /// unknown or the image is empty; otherwise the same failures as
    /// [`NetworkOrchestrator::bring_up`]. A failed node is not added.
    pub async fn add_node(&mut self, spec: NodeSpec) -> Result<&RunningNode<F::Client>, OrchestrationError> {
        self.validate_new(&spec)?;
        let (node, outcome) = self.start(&spec).await?;
        Ok(self.register(node, outcome))
    }

    /// Assign a new node to `partition`, then create it and wait for it.
    ///
    /// The membership is committed through `partitions` before the node is
    /// created, so it never runs outside its partition. If creation or
    /// readiness fails the node is returned to the default partition.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Partition`] when `partition` is not declared in
    /// the current plan or the backend fails; otherwise as
    /// [`add_node`](Self::add_node).
    pub async fn add_node_to_partition<B: PartitionBackend>(
        &mut self,
        spec: NodeSpec,
        partition: &PartitionId,
        partitions: &PartitionController<B>,
    ) -> Result<&RunningNode<F::Client>, OrchestrationError> {
        self.validate_new(&spec)?;
        partitions.add_to_partition(spec.id().clone(), partition).await?;

        match self.start(&spec).await {
            Ok((node, outcome)) => Ok(self.register(node, outcome)),
            Err(err) => {
                let default = PartitionId::default_partition();
                if let Err(rollback) = partitions.add_to_partition(spec.id().clone(), &default).await {
                    tracing::warn!(node = %spec.id(), error = %rollback, "failed to release partition membership");
                }
                Err(err)
            }
        }
    }

    async fn start(&self, spec: &NodeSpec) -> Result<(RunningNode<F::Client>, PollOutcome), OrchestrationError> {
        let span = tracing::info_span!("add_node", node = %spec.id());
        async {
            let node = self.orchestrator.create(spec).await?;
            let outcome = self.orchestrator.await_ready(&node).await?;
            Ok::<_, OrchestrationError>((node, outcome))
        }
        .instrument(span)
        .await
    }

    fn register(&mut self, node: RunningNode<F::Client>, outcome: PollOutcome) -> &RunningNode<F::Client> {
        let id = node.id().clone();
        self.report.readiness.insert(id.clone(), outcome);
        self.nodes.entry(id).or_insert(node)
    }

    /// Give up the orchestrator and keep only the node handles.
    pub fn into_nodes(self) -> BTreeMap<NodeId, RunningNode<F::Client>> {
        self.nodes
    }

    fn validate_new(&self, spec: &NodeSpec) -> Result<(), NodeSetError> {
        if self.nodes.contains_key(spec.id()) {
            return Err(NodeSetError::DuplicateNode(spec.id().clone()));
        }
        if spec.params().image.trim().is_empty() {
            return Err(NodeSetError::EmptyImage(spec.id().clone()));
        }
        for peer in &spec.params().peers {
            if peer == spec.id() {
                return Err(NodeSetError::SelfPeer(spec.id().clone()));
            }
            if !self.nodes.contains_key(peer) {
                return Err(NodeSetError::UnknownPeer {
                    node: spec.id().clone(),
                    peer: peer.clone(),
                });
            }
        }
        Ok(())
    }
}

impl<F: NodeFactory, T: TimeProvider> std::fmt::Debug for ActiveNetwork<F, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveNetwork")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
