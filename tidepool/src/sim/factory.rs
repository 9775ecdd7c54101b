use std::rc::Rc;

use async_trait::async_trait;
use thiserror::Error;

use super::network::ProbeAnswer;
use super::SimNetwork;
use crate::node::{BoxError, NodeFactory, NodeSpec, RunningNode};
use crate::poll::{LivenessProbe, ProbeError};
use crate::{NodeId, TimeProvider, TokioTimeProvider};

/// Provisions nodes into a [`SimNetwork`].
#[derive(Debug, Clone)]
pub struct SimNodeFactory<T: TimeProvider = TokioTimeProvider> {
    network: SimNetwork<T>,
}

impl<T: TimeProvider> SimNodeFactory<T> {
    /// Factory for `network`.
    pub fn new(network: SimNetwork<T>) -> Self {
        Self { network }
    }

    /// The network nodes are provisioned into.
    pub fn network(&self) -> &SimNetwork<T> {
        &self.network
    }
}

#[async_trait(?Send)]
impl<T: TimeProvider + 'static> NodeFactory for SimNodeFactory<T> {
    type Client = SimClient<T>;

    async fn create(&self, spec: &NodeSpec) -> Result<RunningNode<Self::Client>, BoxError> {
        let address = self.network.provision(spec.id(), &spec.params().peers)?;
        let client = SimClient {
            node: spec.id().clone(),
            network: self.network.clone(),
        };
        let probe = Rc::new(SimProbe {
            node: spec.id().clone(),
            network: self.network.clone(),
        });
        Ok(RunningNode::new(spec.id().clone(), address, client, probe))
    }
}

struct SimProbe<T: TimeProvider> {
    node: NodeId,
    network: SimNetwork<T>,
}

#[async_trait(?Send)]
impl<T: TimeProvider> LivenessProbe for SimProbe<T> {
    async fn is_ready(&self) -> Result<bool, ProbeError> {
        match self.network.probe(&self.node) {
            Some(ProbeAnswer::Ready(ready)) => Ok(ready),
            Some(ProbeAnswer::Hang) => std::future::pending().await,
            Some(ProbeAnswer::Crash) => Err(ProbeError::fatal(format!("node '{}' crashed", self.node))),
            None => Err(ProbeError::fatal(format!("node '{}' is not provisioned", self.node))),
        }
    }
}

/// Why a simulated call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimCallError {
    /// The target was never provisioned.
    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),

    /// The enforced partitions block the pair.
    #[error("'{from}' cannot reach '{to}'")]
    Unreachable {
        /// Caller.
        from: NodeId,
        /// Callee.
        to: NodeId,
    },
}

/// Client for one simulated node.
#[derive(Debug, Clone)]
pub struct SimClient<T: TimeProvider = TokioTimeProvider> {
    node: NodeId,
    network: SimNetwork<T>,
}

impl<T: TimeProvider> SimClient<T> {
    /// Node this client belongs to.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Issue a request from this node to `target`.
    ///
    /// # Errors
    ///
    /// [`SimCallError::Unreachable`] while a partition separates the two.
    pub async fn call(&self, target: &NodeId) -> Result<(), SimCallError> {
        if !self.network.is_running(target) {
            return Err(SimCallError::UnknownNode(target.clone()));
        }
        if self.network.deliver(&self.node, target) {
            Ok(())
        } else {
            Err(SimCallError::Unreachable {
                from: self.node.clone(),
                to: target.clone(),
            })
        }
    }
}
