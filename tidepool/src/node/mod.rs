//! Node declarations and live node handles.
//!
//! - [`NodeSpec`] / [`NodeSet`]: what to create, declared once before bring-up
//! - [`NodeFactory`]: the external collaborator that provisions one node
//! - [`RunningNode`]: the exclusive handle to a provisioned node

mod running;
mod spec;

pub use running::{BoxError, NodeFactory, RunningNode};
pub use spec::{Credentials, NodeRole, NodeSet, NodeSetBuilder, NodeSetError, NodeSpec, StartupParams};
