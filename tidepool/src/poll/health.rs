//! Readiness checks for a single node or service.

use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{PollError, PollOutcome, Poller, ProbeError, DEFAULT_PROBE_TIMEOUT};
use crate::{NodeId, RetryPolicy, TimeProvider, TokioTimeProvider};

/// A node's own "is ready" surface.
///
/// Supplied by whatever provisions the node (container runtime, process
/// launcher, in-memory simulation). One call is one liveness check.
#[async_trait(?Send)]
pub trait LivenessProbe {
    /// Whether the node can serve requests right now.
    ///
    /// Return [`ProbeError::Transient`] for "could not ask" (connection
    /// refused while the node boots); it is retried like `Ok(false)`.
    async fn is_ready(&self) -> Result<bool, ProbeError>;
}

/// Polls one node's [`LivenessProbe`] under a retry budget.
pub struct HealthChecker<T: TimeProvider = TokioTimeProvider> {
    node: NodeId,
    probe: Rc<dyn LivenessProbe>,
    time: T,
    cancel: Option<CancellationToken>,
    probe_timeout: Duration,
}

impl HealthChecker<TokioTimeProvider> {
    /// Checker for `node` on Tokio time.
    pub fn new(node: NodeId, probe: Rc<dyn LivenessProbe>) -> Self {
        Self {
            node,
            probe,
            time: TokioTimeProvider::new(),
            cancel: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl<T: TimeProvider> HealthChecker<T> {
    /// Use a different time provider.
    pub fn with_time<U: TimeProvider>(self, time: U) -> HealthChecker<U> {
        HealthChecker {
            node: self.node,
            probe: self.probe,
            time,
            cancel: self.cancel,
            probe_timeout: self.probe_timeout,
        }
    }

    /// Abort the wait as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Count a liveness probe that hangs longer than `limit` as not ready.
    pub fn with_probe_timeout(mut self, limit: Duration) -> Self {
        self.probe_timeout = limit;
        self
    }

    /// The node being checked.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Wait until the node reports ready or `policy` is exhausted.
    pub async fn wait_for_startup(&self, policy: RetryPolicy) -> Result<PollOutcome, PollError> {
        let mut poller = Poller::new(format!("readiness of {}", self.node), policy)
            .with_time(self.time.clone())
            .with_probe_timeout(self.probe_timeout);
        if let Some(token) = &self.cancel {
            poller = poller.with_cancellation(token.clone());
        }

        let probe = self.probe.as_ref();
        poller.until(move || probe.is_ready()).await
    }
}

impl<T: TimeProvider> std::fmt::Debug for HealthChecker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}
