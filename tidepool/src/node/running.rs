//! Live node handles and the factory that produces them.

use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

use async_trait::async_trait;

use super::NodeSpec;
use crate::poll::{HealthChecker, LivenessProbe};
use crate::NodeId;

/// Error type for failures inside external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Provisions one node (container, process, or remote resource).
///
/// Construction of the concrete service kind happens here, once. Networks
/// mixing service kinds pick a `Client` that is an enum over those kinds, so
/// callers match on a variant instead of downcasting a generic handle.
#[async_trait(?Send)]
pub trait NodeFactory {
    /// Protocol-level client handed back for each node.
    type Client;

    /// Start the node described by `spec`.
    ///
    /// Must not wait for readiness; the orchestrator does that through the
    /// returned node's probe.
    async fn create(&self, spec: &NodeSpec) -> Result<RunningNode<Self::Client>, BoxError>;
}

/// A provisioned node: address, client, and readiness probe.
///
/// Owns the underlying resource exclusively; dropping the handle is the
/// factory's cue to release it.
pub struct RunningNode<C> {
    id: NodeId,
    address: SocketAddr,
    client: C,
    probe: Rc<dyn LivenessProbe>,
}

impl<C> RunningNode<C> {
    /// Wrap a freshly provisioned node.
    pub fn new(id: NodeId, address: SocketAddr, client: C, probe: Rc<dyn LivenessProbe>) -> Self {
        Self {
            id,
            address,
            client,
            probe,
        }
    }

    /// Node identity.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Network address the node serves on.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Protocol-level client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The node's liveness probe.
    pub fn probe(&self) -> Rc<dyn LivenessProbe> {
        Rc::clone(&self.probe)
    }

    /// A [`HealthChecker`] bound to this node's probe.
    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker::new(self.id.clone(), self.probe())
    }
}

impl<C> fmt::Debug for RunningNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningNode")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
