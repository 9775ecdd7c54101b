//! Network partitioning.
//!
//! A [`PartitionPlan`] describes the desired global state: which services sit
//! in which partition and which partition pairs may talk. The
//! [`PartitionController`] validates a plan, resolves it to every pair and
//! hands the result to a [`PartitionBackend`] in one call.

mod controller;
mod plan;

pub use controller::{PartitionBackend, PartitionController, PartitionError};
pub use plan::{
    Connectivity, PartitionConnection, PartitionPlan, PartitionPlanBuilder, PlanViolation, ResolvedPartitions,
};
