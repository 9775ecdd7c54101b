//! Declarative partition plans and their resolved form.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{NodeId, PartitionId};

/// Whether traffic may flow between two partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Traffic flows in both directions.
    #[default]
    Allowed,
    /// Traffic is dropped in both directions.
    Blocked,
}

impl Connectivity {
    /// True for [`Connectivity::Blocked`].
    pub fn is_blocked(self) -> bool {
        matches!(self, Self::Blocked)
    }
}

/// One authored connectivity entry.
///
/// Entries are written with a direction but always enforced both ways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConnection {
    /// First partition.
    pub from: PartitionId,
    /// Second partition.
    pub to: PartitionId,
    /// Connectivity between the two.
    pub connectivity: Connectivity,
}

/// Ways a plan can be malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanViolation {
    /// A service is listed in two partitions.
    #[error("service '{service}' is assigned to both '{first}' and '{second}'")]
    ServiceInMultiplePartitions {
        /// The service.
        service: NodeId,
        /// Partition it was first seen in.
        first: PartitionId,
        /// Conflicting partition.
        second: PartitionId,
    },

    /// Both directions of a pair were given different connectivity.
    #[error("conflicting connectivity between '{a}' and '{b}'")]
    ConflictingConnectivity {
        /// One side.
        a: PartitionId,
        /// Other side.
        b: PartitionId,
    },

    /// A partition was connected to itself.
    #[error("partition '{0}' cannot be connected to itself")]
    SelfConnection(PartitionId),

    /// A connection or assignment names a partition the plan does not declare.
    #[error("unknown partition '{0}'")]
    UnknownPartition(PartitionId),
}

/// Desired global partition state.
///
/// Services not listed in any partition belong to the default partition.
/// Every pair of partitions without an explicit entry uses
/// `default_connectivity`. Services inside one partition can always reach
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartitionPlan {
    #[serde(default)]
    partitions: BTreeMap<PartitionId, BTreeSet<NodeId>>,
    #[serde(default)]
    connections: Vec<PartitionConnection>,
    #[serde(default)]
    default_connectivity: Connectivity,
}

impl PartitionPlan {
    /// Start building a plan.
    pub fn builder() -> PartitionPlanBuilder {
        PartitionPlanBuilder::default()
    }

    /// Everyone in the default partition with full connectivity.
    pub fn unpartitioned() -> Self {
        Self::default()
    }

    /// Declared partitions and their members.
    pub fn partitions(&self) -> &BTreeMap<PartitionId, BTreeSet<NodeId>> {
        &self.partitions
    }

    /// Authored connectivity entries.
    pub fn connections(&self) -> &[PartitionConnection] {
        &self.connections
    }

    /// Connectivity for pairs without an explicit entry.
    pub fn default_connectivity(&self) -> Connectivity {
        self.default_connectivity
    }

    /// Move `service` into `partition`, removing it from any other.
    ///
    /// Assigning to the default partition only removes the explicit
    /// membership.
    ///
    /// # Errors
    ///
    /// [`PlanViolation::UnknownPartition`] if `partition` is not declared.
    pub fn assign(&mut self, service: NodeId, partition: &PartitionId) -> Result<(), PlanViolation> {
        if !partition.is_default() && !self.partitions.contains_key(partition) {
            return Err(PlanViolation::UnknownPartition(partition.clone()));
        }
        for members in self.partitions.values_mut() {
            members.remove(&service);
        }
        if let Some(members) = self.partitions.get_mut(partition) {
            members.insert(service);
        }
        Ok(())
    }

    /// Check the plan's invariants.
    ///
    /// # Errors
    ///
    /// The first [`PlanViolation`] found.
    pub fn validate(&self) -> Result<(), PlanViolation> {
        let mut seen: BTreeMap<&NodeId, &PartitionId> = BTreeMap::new();
        for (partition, members) in &self.partitions {
            for service in members {
                if let Some(first) = seen.insert(service, partition) {
                    return Err(PlanViolation::ServiceInMultiplePartitions {
                        service: service.clone(),
                        first: first.clone(),
                        second: partition.clone(),
                    });
                }
            }
        }

        let mut explicit = BTreeMap::new();
        for connection in &self.connections {
            if connection.from == connection.to {
                return Err(PlanViolation::SelfConnection(connection.from.clone()));
            }
            for side in [&connection.from, &connection.to] {
                if !self.declares(side) {
                    return Err(PlanViolation::UnknownPartition(side.clone()));
                }
            }
            let key = unordered(&connection.from, &connection.to);
            match explicit.insert(key, connection.connectivity) {
                Some(previous) if previous != connection.connectivity => {
                    return Err(PlanViolation::ConflictingConnectivity {
                        a: connection.from.clone(),
                        b: connection.to.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate and expand into the form a backend enforces.
    ///
    /// # Errors
    ///
    /// The first [`PlanViolation`] found.
    pub fn resolve(&self) -> Result<ResolvedPartitions, PlanViolation> {
        self.validate()?;

        let explicit: BTreeMap<_, _> = self
            .connections
            .iter()
            .map(|c| (unordered(&c.from, &c.to), c.connectivity))
            .collect();

        let mut ids: BTreeSet<PartitionId> = self.partitions.keys().cloned().collect();
        ids.insert(PartitionId::default_partition());
        let ids: Vec<_> = ids.into_iter().collect();

        let mut connectivity = BTreeMap::new();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let key = unordered(a, b);
                let value = explicit.get(&key).copied().unwrap_or(self.default_connectivity);
                connectivity.insert(key, value);
            }
        }

        let assignment = self
            .partitions
            .iter()
            .flat_map(|(partition, members)| members.iter().map(move |s| (s.clone(), partition.clone())))
            .collect();

        Ok(ResolvedPartitions {
            members: self.partitions.clone(),
            assignment,
            connectivity,
            default_connectivity: self.default_connectivity,
            default_partition: PartitionId::default_partition(),
        })
    }

    fn declares(&self, partition: &PartitionId) -> bool {
        partition.is_default() || self.partitions.contains_key(partition)
    }
}

fn unordered(a: &PartitionId, b: &PartitionId) -> (PartitionId, PartitionId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Builder for [`PartitionPlan`].
#[derive(Debug, Default)]
pub struct PartitionPlanBuilder {
    plan: PartitionPlan,
}

impl PartitionPlanBuilder {
    /// Declare `partition` with `services`; repeated calls extend it.
    pub fn partition<I, S>(mut self, partition: impl Into<PartitionId>, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.plan
            .partitions
            .entry(partition.into())
            .or_default()
            .extend(services.into_iter().map(Into::into));
        self
    }

    /// Set connectivity between two partitions.
    pub fn connect(mut self, from: impl Into<PartitionId>, to: impl Into<PartitionId>, connectivity: Connectivity) -> Self {
        self.plan.connections.push(PartitionConnection {
            from: from.into(),
            to: to.into(),
            connectivity,
        });
        self
    }

    /// Block traffic between two partitions.
    pub fn block(self, a: impl Into<PartitionId>, b: impl Into<PartitionId>) -> Self {
        self.connect(a, b, Connectivity::Blocked)
    }

    /// Allow traffic between two partitions.
    pub fn allow(self, a: impl Into<PartitionId>, b: impl Into<PartitionId>) -> Self {
        self.connect(a, b, Connectivity::Allowed)
    }

    /// Connectivity for pairs without an explicit entry.
    pub fn default_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.plan.default_connectivity = connectivity;
        self
    }

    /// Validate and return the plan.
    ///
    /// # Errors
    ///
    /// The first [`PlanViolation`] found.
    pub fn build(self) -> Result<PartitionPlan, PlanViolation> {
        self.plan.validate()?;
        Ok(self.plan)
    }
}

/// A validated plan expanded to every unordered pair of partitions.
///
/// The default value is the unpartitioned network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedPartitions {
    members: BTreeMap<PartitionId, BTreeSet<NodeId>>,
    assignment: BTreeMap<NodeId, PartitionId>,
    connectivity: BTreeMap<(PartitionId, PartitionId), Connectivity>,
    default_connectivity: Connectivity,
    default_partition: PartitionId,
}

impl ResolvedPartitions {
    /// Explicitly assigned members by partition.
    pub fn members(&self) -> &BTreeMap<PartitionId, BTreeSet<NodeId>> {
        &self.members
    }

    /// Every unordered pair of partitions, the default one included, with its
    /// effective connectivity.
    pub fn pairs(&self) -> impl Iterator<Item = (&PartitionId, &PartitionId, Connectivity)> {
        self.connectivity.iter().map(|((a, b), c)| (a, b, *c))
    }

    /// Connectivity used for pairs the plan did not list.
    pub fn default_connectivity(&self) -> Connectivity {
        self.default_connectivity
    }

    /// Partition holding `service`; the default partition when unassigned.
    pub fn partition_of(&self, service: &NodeId) -> &PartitionId {
        self.assignment.get(service).unwrap_or(&self.default_partition)
    }

    /// Effective connectivity between two partitions, in either order.
    pub fn connectivity(&self, a: &PartitionId, b: &PartitionId) -> Connectivity {
        if a == b {
            return Connectivity::Allowed;
        }
        self.connectivity
            .get(&unordered(a, b))
            .copied()
            .unwrap_or(self.default_connectivity)
    }

    /// Whether `from` can exchange traffic with `to`.
    pub fn can_reach(&self, from: &NodeId, to: &NodeId) -> bool {
        !self.connectivity(self.partition_of(from), self.partition_of(to)).is_blocked()
    }
}
