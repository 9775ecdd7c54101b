//! # Tidepool
//!
//! Bring up multi-node test networks in order, partition them, and wait for
//! asynchronous outcomes with bounded retries instead of fixed sleeps.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    tidepool (this crate)                    │
//! │  NetworkOrchestrator ──bring_up──▶ ActiveNetwork            │
//! │  PartitionController ──apply────▶ PartitionBackend          │
//! │  HealthChecker / ConfirmationPoller ──▶ Poller              │
//! │  sim: in-memory NodeFactory + PartitionBackend              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      tidepool-core                          │
//! │  TimeProvider, RetryPolicy, NodeId, PartitionId             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use tidepool::sim::SimNetwork;
//! use tidepool::{NetworkOrchestrator, NodeSet, PartitionController, PartitionPlan};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let network = SimNetwork::new();
//! let nodes = NodeSet::builder("node:latest")
//!     .bootstrap(None)
//!     .bootstrap(None)
//!     .dependent("worker")
//!     .build()?;
//!
//! let active = NetworkOrchestrator::new(network.factory()).bring_up(nodes).await?;
//! assert_eq!(active.len(), 3);
//!
//! let partitions = PartitionController::new(network.clone());
//! partitions
//!     .apply(
//!         PartitionPlan::builder()
//!             .partition("isolated", ["worker"])
//!             .block("isolated", tidepool::PartitionId::default_partition())
//!             .build()?,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use tidepool_core::*;

pub mod config;
pub mod node;
pub mod orchestrator;
pub mod partition;
pub mod poll;
pub mod sim;

pub use config::{init_logging, ConfigError, HarnessConfig};
pub use node::{
    BoxError, Credentials, NodeFactory, NodeRole, NodeSet, NodeSetBuilder, NodeSetError, NodeSpec, RunningNode,
    StartupParams,
};
pub use orchestrator::{ActiveNetwork, BringUpReport, NetworkOrchestrator, OrchestrationError};
pub use partition::{
    Connectivity, PartitionBackend, PartitionConnection, PartitionController, PartitionError, PartitionPlan,
    PartitionPlanBuilder, PlanViolation, ResolvedPartitions,
};
pub use poll::{
    ConfirmationPoller, HealthChecker, LivenessProbe, PollError, PollOutcome, Poller, ProbeError, DEFAULT_PROBE_TIMEOUT,
};
