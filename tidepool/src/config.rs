//! Harness configuration and logging bootstrap.
//!
//! ```json
//! {
//!   "image": "avalanche-go:latest",
//!   "bootstrap_nodes": 3,
//!   "dependent_nodes": ["worker-1", "worker-2"],
//!   "health": { "max_attempts": 30, "delay_ms": 5000 },
//!   "confirmation": { "max_attempts": 10, "delay_ms": 1000 },
//!   "log_level": "info"
//! }
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::node::{NodeSet, NodeSetError};
use crate::partition::{PartitionPlan, PlanViolation};
use crate::{NodeId, RetryPolicy};

/// Errors from loading a [`HarnessConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Not valid JSON, or fields of the wrong shape.
    #[error("failed to parse harness config: {0}")]
    Parse(#[from] serde_json::Error),

    /// No bootstrap node was requested.
    #[error("at least one bootstrap node is required")]
    NoBootstrapNodes,

    /// The declared nodes do not form a valid set.
    #[error("invalid node declaration: {0}")]
    Nodes(#[from] NodeSetError),

    /// `log_level` is not a tracing level.
    #[error("unknown log level '{0}'")]
    InvalidLogLevel(String),

    /// The configured partition plan is malformed.
    #[error("invalid partition plan: {0}")]
    Partition(#[from] PlanViolation),
}

/// Everything a test driver needs to bring up and poll a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Image every node runs.
    pub image: String,
    /// Number of bootstrap nodes.
    pub bootstrap_nodes: u32,
    /// IDs of dependent nodes.
    #[serde(default)]
    pub dependent_nodes: Vec<NodeId>,
    /// Readiness budget per node.
    #[serde(default = "RetryPolicy::node_startup")]
    pub health: RetryPolicy,
    /// Budget for confirming asynchronous operations.
    #[serde(default = "RetryPolicy::transaction_mined")]
    pub confirmation: RetryPolicy,
    /// Maximum level logged by [`init_logging`].
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Plan applied once the network is up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<PartitionPlan>,
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl HarnessConfig {
    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed JSON, otherwise whatever
    /// [`validate`](Self::validate) reports.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the config describes a network that can be brought up.
    ///
    /// # Errors
    ///
    /// The first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap_nodes == 0 {
            return Err(ConfigError::NoBootstrapNodes);
        }
        self.level()?;
        self.node_set()?;
        if let Some(plan) = &self.partitions {
            plan.validate()?;
        }
        Ok(())
    }

    /// Parsed `log_level`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidLogLevel`].
    pub fn level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    /// Node declarations: `bootstrap_nodes` chained bootstrap nodes, then the
    /// dependents, each peered with every bootstrap node.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Nodes`] for an empty image or clashing IDs.
    pub fn node_set(&self) -> Result<NodeSet, ConfigError> {
        let mut builder = NodeSet::builder(self.image.clone());
        for _ in 0..self.bootstrap_nodes {
            builder = builder.bootstrap(None);
        }
        for id in &self.dependent_nodes {
            builder = builder.dependent(id.clone());
        }
        Ok(builder.build()?)
    }
}

/// Install a `fmt` subscriber logging at `level` and above.
///
/// Does nothing if a global subscriber is already set.
pub fn init_logging(level: Level) {
    let _ = tracing_subscriber::fmt().with_max_level(level).with_target(false).try_init();
}
