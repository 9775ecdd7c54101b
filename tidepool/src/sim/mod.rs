//! In-memory network for exercising the harness without real infrastructure.
//!
//! [`SimNetwork`] plays every external collaborator at once: it provisions
//! nodes through [`SimNodeFactory`], answers their liveness probes from a
//! script, and enforces partitions as a [`PartitionBackend`](crate::PartitionBackend).
//! Everything it does lands in an event log stamped with its
//! [`TimeProvider`](crate::TimeProvider), so tests can assert on ordering and
//! virtual elapsed time.

mod factory;
mod network;

pub use factory::{SimCallError, SimClient, SimNodeFactory};
pub use network::{SimError, SimEvent, SimEventKind, SimNetwork};
