//! # tidepool-core
//!
//! Core abstractions shared by every tidepool component.
//!
//! - **Provider traits**: [`TimeProvider`] so that polling loops can run on
//!   real time or on a paused Tokio clock
//! - **Identifiers**: [`NodeId`] and [`PartitionId`]
//! - **Retry budgets**: [`RetryPolicy`] and [`Backoff`], the single knob that
//!   bounds every wait in the harness

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod retry;
mod time;
mod types;

pub use retry::{Backoff, RetryPolicy, RetryPolicyError};
pub use time::{TimeError, TimeProvider, TokioTimeProvider};
pub use types::{NodeId, PartitionId, ServiceId};
