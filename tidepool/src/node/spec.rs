//! Declarative node definitions.
//!
//! A [`NodeSet`] is built once, validated, and handed to the orchestrator.
//! [`NodeSetBuilder`] reproduces the usual peer-network layout: each
//! bootstrap node lists the bootstrap nodes declared before it as peers, and
//! each dependent node lists every bootstrap node.
//!
//! ```
//! use tidepool::{NodeId, NodeSet};
//!
//! let nodes = NodeSet::builder("avalanche:latest")
//!     .bootstrap(None)
//!     .bootstrap(None)
//!     .dependent("validator-1")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(nodes.bootstrap_nodes().len(), 2);
//! assert_eq!(nodes.bootstrap_nodes()[1].params().peers, vec![NodeId::bootstrap(1)]);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::NodeId;

/// Whether a node seeds the network or joins it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Seeds the peer network; must be healthy before dependents start.
    Bootstrap {
        /// 1-based position among bootstrap nodes.
        index: u32,
    },
    /// Joins through the bootstrap nodes.
    Dependent,
}

/// Key material for a staking node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Private key, opaque to tidepool.
    pub private_key: String,
    /// TLS certificate, opaque to tidepool.
    pub tls_cert: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("private_key", &"<redacted>")
            .field("tls_cert", &self.tls_cert)
            .finish()
    }
}

/// Startup parameters passed through to the [`NodeFactory`](super::NodeFactory).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartupParams {
    /// Image or binary reference.
    pub image: String,
    /// Staking credentials, if any.
    pub credentials: Option<Credentials>,
    /// Nodes this node connects to on startup.
    pub peers: Vec<NodeId>,
    /// Free-form factory-specific arguments.
    pub args: BTreeMap<String, String>,
}

impl StartupParams {
    /// Parameters for `image` with no peers or credentials.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Set the peer list.
    pub fn with_peers(mut self, peers: Vec<NodeId>) -> Self {
        self.peers = peers;
        self
    }

    /// Set staking credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Add a factory-specific argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// Declaration of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    id: NodeId,
    role: NodeRole,
    params: StartupParams,
}

impl NodeSpec {
    /// Bootstrap node with the canonical ID for `index`.
    pub fn bootstrap(index: u32, params: StartupParams) -> Self {
        Self {
            id: NodeId::bootstrap(index),
            role: NodeRole::Bootstrap { index },
            params,
        }
    }

    /// Dependent node.
    pub fn dependent(id: impl Into<NodeId>, params: StartupParams) -> Self {
        Self {
            id: id.into(),
            role: NodeRole::Dependent,
            params,
        }
    }

    /// Node identity.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Node role.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Startup parameters.
    pub fn params(&self) -> &StartupParams {
        &self.params
    }

    /// Whether this is a bootstrap node.
    pub fn is_bootstrap(&self) -> bool {
        matches!(self.role, NodeRole::Bootstrap { .. })
    }

    /// Bootstrap index, for bootstrap nodes only.
    pub fn bootstrap_index(&self) -> Option<u32> {
        match self.role {
            NodeRole::Bootstrap { index } => Some(index),
            NodeRole::Dependent => None,
        }
    }
}

/// Errors from validating a [`NodeSet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeSetError {
    /// Two nodes share an ID.
    #[error("node '{0}' is declared more than once")]
    DuplicateNode(NodeId),

    /// Bootstrap indices must be exactly 1..=n.
    #[error("bootstrap indices must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousBootstrap {
        /// Index expected at this position.
        expected: u32,
        /// Index actually declared.
        found: u32,
    },

    /// A peer list names an undeclared node.
    #[error("node '{node}' lists unknown peer '{peer}'")]
    UnknownPeer {
        /// Node with the bad peer list.
        node: NodeId,
        /// The undeclared peer.
        peer: NodeId,
    },

    /// A node lists itself as a peer.
    #[error("node '{0}' lists itself as a peer")]
    SelfPeer(NodeId),

    /// A node has no image to start from.
    #[error("node '{0}' has an empty image reference")]
    EmptyImage(NodeId),
}

/// Validated, immutable collection of node declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSet {
    /// Sorted by bootstrap index.
    bootstrap: Vec<NodeSpec>,
    /// In declaration order.
    dependent: Vec<NodeSpec>,
}

impl NodeSet {
    /// Start a builder whose generated nodes run `image`.
    pub fn builder(image: impl Into<String>) -> NodeSetBuilder {
        NodeSetBuilder {
            image: image.into(),
            specs: Vec::new(),
            next_bootstrap: 1,
        }
    }

    /// Validate and wrap a list of specs.
    ///
    /// # Errors
    ///
    /// See [`NodeSetError`].
    pub fn new(specs: Vec<NodeSpec>) -> Result<Self, NodeSetError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.id.clone()) {
                return Err(NodeSetError::DuplicateNode(spec.id.clone()));
            }
            if spec.params.image.trim().is_empty() {
                return Err(NodeSetError::EmptyImage(spec.id.clone()));
            }
        }

        for spec in &specs {
            for peer in &spec.params.peers {
                if peer == &spec.id {
                    return Err(NodeSetError::SelfPeer(spec.id.clone()));
                }
                if !seen.contains(peer) {
                    return Err(NodeSetError::UnknownPeer {
                        node: spec.id.clone(),
                        peer: peer.clone(),
                    });
                }
            }
        }

        let (mut bootstrap, dependent): (Vec<_>, Vec<_>) =
            specs.into_iter().partition(NodeSpec::is_bootstrap);
        bootstrap.sort_by_key(|spec| spec.bootstrap_index());

        for (expected, spec) in (1u32..).zip(&bootstrap) {
            let found = spec.bootstrap_index().unwrap_or_default();
            if found != expected {
                return Err(NodeSetError::NonContiguousBootstrap { expected, found });
            }
        }

        Ok(Self {
            bootstrap,
            dependent,
        })
    }

    /// Bootstrap nodes in ascending index order.
    pub fn bootstrap_nodes(&self) -> &[NodeSpec] {
        &self.bootstrap
    }

    /// Dependent nodes in declaration order.
    pub fn dependent_nodes(&self) -> &[NodeSpec] {
        &self.dependent
    }

    /// All nodes, bootstrap first.
    pub fn iter(&self) -> impl Iterator<Item = &NodeSpec> {
        self.bootstrap.iter().chain(self.dependent.iter())
    }

    /// Look up a node by ID.
    pub fn get(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.iter().find(|spec| &spec.id == id)
    }

    /// Whether a node with this ID is declared.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.bootstrap.len() + self.dependent.len()
    }

    /// Whether the set declares no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builder for [`NodeSet`].
#[derive(Debug)]
pub struct NodeSetBuilder {
    image: String,
    /// Specs plus whether their peers are filled in at build time.
    specs: Vec<(NodeSpec, bool)>,
    next_bootstrap: u32,
}

impl NodeSetBuilder {
    /// Add the next bootstrap node.
    ///
    /// Its peers are the bootstrap nodes added before it.
    pub fn bootstrap(mut self, credentials: Option<Credentials>) -> Self {
        let index = self.next_bootstrap;
        self.next_bootstrap += 1;

        let peers = (1..index).map(NodeId::bootstrap).collect();
        let mut params = StartupParams::new(self.image.clone()).with_peers(peers);
        params.credentials = credentials;

        self.specs.push((NodeSpec::bootstrap(index, params), false));
        self
    }

    /// Add a dependent node peered with every bootstrap node.
    pub fn dependent(mut self, id: impl Into<NodeId>) -> Self {
        let spec = NodeSpec::dependent(id, StartupParams::new(self.image.clone()));
        self.specs.push((spec, true));
        self
    }

    /// Add a fully custom node.
    pub fn node(mut self, spec: NodeSpec) -> Self {
        if let Some(index) = spec.bootstrap_index() {
            self.next_bootstrap = self.next_bootstrap.max(index + 1);
        }
        self.specs.push((spec, false));
        self
    }

    /// Resolve peer lists and validate.
    ///
    /// # Errors
    ///
    /// See [`NodeSetError`].
    pub fn build(self) -> Result<NodeSet, NodeSetError> {
        let mut bootstrap_ids: Vec<(u32, NodeId)> = self
            .specs
            .iter()
            .filter_map(|(spec, _)| spec.bootstrap_index().map(|i| (i, spec.id.clone())))
            .collect();
        bootstrap_ids.sort();
        let bootstrap_ids: Vec<NodeId> = bootstrap_ids.into_iter().map(|(_, id)| id).collect();

        let specs = self
            .specs
            .into_iter()
            .map(|(mut spec, auto_peers)| {
                if auto_peers {
                    spec.params.peers = bootstrap_ids.clone();
                }
                spec
            })
            .collect();

        NodeSet::new(specs)
    }
}
