//! Applies partition plans to a running network.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::Instrument;

use super::plan::{Connectivity, PartitionPlan, PlanViolation, ResolvedPartitions};
use crate::node::BoxError;
use crate::{NodeId, PartitionId};

/// Enforces resolved partitions at the network layer.
///
/// A call either commits the whole state or fails without changing what is
/// enforced.
#[async_trait(?Send)]
pub trait PartitionBackend {
    /// Replace the enforced partition state with `partitions`.
    async fn repartition(&self, partitions: &ResolvedPartitions) -> Result<(), BoxError>;
}

/// Errors from [`PartitionController`].
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The plan is malformed; the backend was not called.
    #[error("invalid partition plan: {0}")]
    Validation(#[from] PlanViolation),

    /// The backend refused or failed to enforce the plan.
    #[error("partition backend failed: {source}")]
    Backend {
        /// Backend error.
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Default)]
struct Applied {
    plan: PartitionPlan,
    resolved: ResolvedPartitions,
}

/// Single source of truth for the partition state of one network.
///
/// Every call takes a per-controller lock, so calls are serialized. Callers
/// issuing `apply` concurrently still race: whichever commits last wins.
pub struct PartitionController<B: PartitionBackend> {
    backend: B,
    state: Mutex<Applied>,
}

impl<B: PartitionBackend> PartitionController<B> {
    /// Controller for `backend`, starting from the unpartitioned state.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(Applied::default()),
        }
    }

    /// The backend this controller drives.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Replace the whole partition state with `plan`.
    ///
    /// # Errors
    ///
    /// [`PartitionError::Validation`] before any backend call, or
    /// [`PartitionError::Backend`] with the previous state still recorded.
    pub async fn apply(&self, plan: PartitionPlan) -> Result<(), PartitionError> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, plan).await
    }

    /// Return every service to one fully connected partition.
    pub async fn heal(&self) -> Result<(), PartitionError> {
        self.apply(PartitionPlan::unpartitioned()).await
    }

    /// Move `service` into `partition` within the current plan and re-apply.
    ///
    /// # Errors
    ///
    /// [`PlanViolation::UnknownPartition`] when the current plan does not
    /// declare `partition`; otherwise as [`apply`](Self::apply).
    pub async fn add_to_partition(&self, service: NodeId, partition: &PartitionId) -> Result<(), PartitionError> {
        let mut state = self.state.lock().await;
        let mut plan = state.plan.clone();
        plan.assign(service, partition)?;
        self.commit(&mut state, plan).await
    }

    /// The last successfully applied plan.
    pub async fn current(&self) -> PartitionPlan {
        self.state.lock().await.plan.clone()
    }

    /// The last successfully applied plan, resolved.
    pub async fn resolved(&self) -> ResolvedPartitions {
        self.state.lock().await.resolved.clone()
    }

    /// Enforced connectivity between two partitions.
    pub async fn effective_connectivity(&self, a: &PartitionId, b: &PartitionId) -> Connectivity {
        self.state.lock().await.resolved.connectivity(a, b)
    }

    async fn commit(&self, state: &mut Applied, plan: PartitionPlan) -> Result<(), PartitionError> {
        let resolved = plan.resolve().map_err(|violation| {
            tracing::warn!(error = %violation, "rejected partition plan");
            violation
        })?;

        let span = tracing::info_span!(
            "repartition",
            partitions = resolved.members().len(),
            default = ?resolved.default_connectivity()
        );
        async {
            self.backend
                .repartition(&resolved)
                .await
                .map_err(|source| {
                    tracing::error!(error = %source, "backend failed to repartition");
                    PartitionError::Backend { source }
                })?;
            for (a, b, connectivity) in resolved.pairs() {
                tracing::debug!(%a, %b, ?connectivity, "partition pair");
            }
            tracing::info!("network repartitioned");
            Ok::<_, PartitionError>(())
        }
        .instrument(span)
        .await?;

        *state = Applied { plan, resolved };
        Ok(())
    }
}

impl<B: PartitionBackend> std::fmt::Debug for PartitionController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionController").finish_non_exhaustive()
    }
}
