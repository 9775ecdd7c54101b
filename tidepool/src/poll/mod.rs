//! Bounded-retry polling.
//!
//! One scheduling discipline serves every "eventually true" question the
//! harness asks:
//!
//! - [`HealthChecker`]: is this node ready to serve yet?
//! - [`ConfirmationPoller`]: has this asynchronous operation taken effect yet?
//!
//! Both delegate to [`Poller`], which issues one probe per attempt, sleeps the
//! [`RetryPolicy`](crate::RetryPolicy) delay between failed attempts, and gives
//! up with [`PollError::Timeout`] after the last attempt.

mod confirm;
mod health;
mod poller;

pub use confirm::ConfirmationPoller;
pub use health::{HealthChecker, LivenessProbe};
pub use poller::{PollError, PollOutcome, Poller, ProbeError, DEFAULT_PROBE_TIMEOUT};
