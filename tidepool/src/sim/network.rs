use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::SimNodeFactory;
use crate::node::BoxError;
use crate::partition::{PartitionBackend, ResolvedPartitions};
use crate::{NodeId, TimeProvider, TokioTimeProvider};

/// Port every simulated node listens on.
const NODE_PORT: u16 = 9650;

/// Failures injected or detected by the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Creation was scripted to fail.
    #[error("creation of '{0}' refused by script")]
    CreationRefused(NodeId),

    /// A node with this ID is already running.
    #[error("node '{0}' is already running")]
    AlreadyRunning(NodeId),

    /// No more addresses in the simulated subnet.
    #[error("simulated subnet exhausted")]
    AddressesExhausted,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEventKind {
    /// A node was provisioned.
    Created {
        /// The node.
        node: NodeId,
        /// Peers it was told to connect to.
        peers: Vec<NodeId>,
    },
    /// A node's liveness probe was called.
    Probed {
        /// The node.
        node: NodeId,
        /// What the probe answered.
        ready: bool,
    },
    /// A new partition state was enforced.
    Repartitioned,
    /// One node called another.
    Called {
        /// Caller.
        from: NodeId,
        /// Callee.
        to: NodeId,
        /// Whether the partition state let the call through.
        delivered: bool,
    },
}

/// A logged simulation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimEvent {
    /// Time since the network was created.
    pub at: Duration,
    /// What happened.
    pub kind: SimEventKind,
}

#[derive(Debug, Clone, Copy)]
enum Readiness {
    AfterProbes(u32),
    Never,
    Hang,
    Crash,
}

/// How a simulated liveness probe answers.
pub(super) enum ProbeAnswer {
    Ready(bool),
    Hang,
    Crash,
}

#[derive(Debug)]
struct SimNode {
    address: SocketAddr,
    probes: u32,
}

#[derive(Debug, Default)]
struct SimInner {
    nodes: BTreeMap<NodeId, SimNode>,
    readiness: BTreeMap<NodeId, Readiness>,
    refuse: BTreeSet<NodeId>,
    partitions: ResolvedPartitions,
    events: Vec<SimEvent>,
    next_host: u8,
}

/// Shared handle to one simulated network.
///
/// Clones share state. Nodes are ready on their first probe unless scripted
/// otherwise.
#[derive(Debug, Clone)]
pub struct SimNetwork<T: TimeProvider = TokioTimeProvider> {
    inner: Rc<RefCell<SimInner>>,
    time: T,
}

impl SimNetwork<TokioTimeProvider> {
    /// Empty network on Tokio time.
    pub fn new() -> Self {
        Self::with_time(TokioTimeProvider::new())
    }
}

impl Default for SimNetwork<TokioTimeProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeProvider> SimNetwork<T> {
    /// Empty network stamping events with `time`.
    pub fn with_time(time: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SimInner::default())),
            time,
        }
    }

    /// Factory provisioning nodes into this network.
    pub fn factory(&self) -> SimNodeFactory<T> {
        SimNodeFactory::new(self.clone())
    }

    /// Report ready from the `probes`-th probe on (1 = immediately).
    pub fn ready_after(&self, node: impl Into<NodeId>, probes: u32) -> &Self {
        self.inner
            .borrow_mut()
            .readiness
            .insert(node.into(), Readiness::AfterProbes(probes));
        self
    }

    /// Never report ready.
    pub fn never_ready(&self, node: impl Into<NodeId>) -> &Self {
        self.inner.borrow_mut().readiness.insert(node.into(), Readiness::Never);
        self
    }

    /// Make every liveness probe of this node hang forever.
    pub fn hang(&self, node: impl Into<NodeId>) -> &Self {
        self.inner.borrow_mut().readiness.insert(node.into(), Readiness::Hang);
        self
    }

    /// Make the first liveness probe of this node fail permanently.
    pub fn crash_on_probe(&self, node: impl Into<NodeId>) -> &Self {
        self.inner.borrow_mut().readiness.insert(node.into(), Readiness::Crash);
        self
    }

    /// Refuse to create this node.
    pub fn fail_creation(&self, node: impl Into<NodeId>) -> &Self {
        self.inner.borrow_mut().refuse.insert(node.into());
        self
    }

    /// Every event so far, in order.
    pub fn events(&self) -> Vec<SimEvent> {
        self.inner.borrow().events.clone()
    }

    /// Nodes in creation order.
    pub fn created(&self) -> Vec<NodeId> {
        self.inner
            .borrow()
            .events
            .iter()
            .filter_map(|event| match &event.kind {
                SimEventKind::Created { node, .. } => Some(node.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether `node` has been provisioned.
    pub fn is_running(&self, node: &NodeId) -> bool {
        self.inner.borrow().nodes.contains_key(node)
    }

    /// Address of a provisioned node.
    pub fn address_of(&self, node: &NodeId) -> Option<SocketAddr> {
        self.inner.borrow().nodes.get(node).map(|n| n.address)
    }

    /// How often `node` has been probed.
    pub fn probe_count(&self, node: &NodeId) -> u32 {
        self.inner.borrow().nodes.get(node).map_or(0, |n| n.probes)
    }

    /// Currently enforced partition state.
    pub fn partitions(&self) -> ResolvedPartitions {
        self.inner.borrow().partitions.clone()
    }

    /// Whether the enforced partitions let `from` talk to `to`.
    pub fn can_reach(&self, from: &NodeId, to: &NodeId) -> bool {
        self.inner.borrow().partitions.can_reach(from, to)
    }

    pub(super) fn provision(&self, node: &NodeId, peers: &[NodeId]) -> Result<SocketAddr, SimError> {
        let mut inner = self.inner.borrow_mut();
        if inner.refuse.contains(node) {
            return Err(SimError::CreationRefused(node.clone()));
        }
        if inner.nodes.contains_key(node) {
            return Err(SimError::AlreadyRunning(node.clone()));
        }
        let host = inner.next_host.checked_add(1).ok_or(SimError::AddressesExhausted)?;
        inner.next_host = host;

        let address = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, host)), NODE_PORT);
        inner.nodes.insert(node.clone(), SimNode { address, probes: 0 });
        self.record(
            &mut inner,
            SimEventKind::Created {
                node: node.clone(),
                peers: peers.to_vec(),
            },
        );
        tracing::debug!(%node, %address, "simulated node provisioned");
        Ok(address)
    }

    /// `None` if the node is unknown.
    pub(super) fn probe(&self, node: &NodeId) -> Option<ProbeAnswer> {
        let mut inner = self.inner.borrow_mut();
        let script = inner.readiness.get(node).copied();
        let state = inner.nodes.get_mut(node)?;
        state.probes += 1;
        let ready = match script {
            None => true,
            Some(Readiness::AfterProbes(n)) => state.probes >= n,
            Some(Readiness::Never) => false,
            Some(Readiness::Hang) => return Some(ProbeAnswer::Hang),
            Some(Readiness::Crash) => return Some(ProbeAnswer::Crash),
        };
        self.record(&mut inner, SimEventKind::Probed { node: node.clone(), ready });
        Some(ProbeAnswer::Ready(ready))
    }

    pub(super) fn deliver(&self, from: &NodeId, to: &NodeId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let delivered = inner.partitions.can_reach(from, to);
        self.record(
            &mut inner,
            SimEventKind::Called {
                from: from.clone(),
                to: to.clone(),
                delivered,
            },
        );
        delivered
    }

    fn record(&self, inner: &mut SimInner, kind: SimEventKind) {
        inner.events.push(SimEvent {
            at: self.time.now(),
            kind,
        });
    }
}

#[async_trait(?Send)]
impl<T: TimeProvider> PartitionBackend for SimNetwork<T> {
    async fn repartition(&self, partitions: &ResolvedPartitions) -> Result<(), BoxError> {
        let mut inner = self.inner.borrow_mut();
        inner.partitions = partitions.clone();
        self.record(&mut inner, SimEventKind::Repartitioned);
        Ok(())
    }
}
