//! Identifiers for nodes, services and partitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a node or service, unique within one test network.
///
/// Bootstrap nodes use the canonical `bootstrapNode-<i>` form produced by
/// [`NodeId::bootstrap`]; other nodes may use any label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Services and nodes share one namespace.
pub type ServiceId = NodeId;

impl NodeId {
    /// Prefix of canonical bootstrap node IDs.
    pub const BOOTSTRAP_PREFIX: &'static str = "bootstrapNode-";

    /// Create an ID from any label.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Canonical ID of the bootstrap node with the given 1-based index.
    pub fn bootstrap(index: u32) -> Self {
        Self(format!("{}{}", Self::BOOTSTRAP_PREFIX, index))
    }

    /// The raw label.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Label of a logical network partition.
///
/// The empty label is the distinguished default partition: every service not
/// explicitly assigned elsewhere lives there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    /// Create a partition label.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The default partition.
    pub fn default_partition() -> Self {
        Self(String::new())
    }

    /// Whether this is the default partition.
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw label (empty for the default partition).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for PartitionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PartitionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
