//! Confirmation that an asynchronous operation took effect.
//!
//! Different confirmations (a transaction being mined, state reaching a
//! replica) share the same polling shape but not the same predicate, so the
//! caller supplies the predicate:
//!
//! ```ignore
//! let poller = ConfirmationPoller::new();
//! poller
//!     .await_condition(format!("transaction {hash} mined"), RetryPolicy::transaction_mined(), || async {
//!         let receipt = client.receipt(&hash).await.map_err(ProbeError::transient)?;
//!         Ok(receipt.and_then(|r| r.block_number).is_some())
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{PollError, PollOutcome, Poller, ProbeError, DEFAULT_PROBE_TIMEOUT};
use crate::{RetryPolicy, TimeProvider, TokioTimeProvider};

/// Polls a caller-supplied predicate until it holds.
#[derive(Debug, Clone)]
pub struct ConfirmationPoller<T: TimeProvider = TokioTimeProvider> {
    time: T,
    cancel: Option<CancellationToken>,
    probe_timeout: Duration,
}

impl ConfirmationPoller<TokioTimeProvider> {
    /// Poller on Tokio time.
    pub fn new() -> Self {
        Self {
            time: TokioTimeProvider::new(),
            cancel: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl Default for ConfirmationPoller<TokioTimeProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeProvider> ConfirmationPoller<T> {
    /// Use a different time provider.
    pub fn with_time<U: TimeProvider>(self, time: U) -> ConfirmationPoller<U> {
        ConfirmationPoller {
            time,
            cancel: self.cancel,
            probe_timeout: self.probe_timeout,
        }
    }

    /// Abort waits as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Count a predicate call hanging longer than `limit` as "not yet".
    ///
    /// Defaults to [`DEFAULT_PROBE_TIMEOUT`].
    pub fn with_probe_timeout(mut self, limit: Duration) -> Self {
        self.probe_timeout = limit;
        self
    }

    /// Wait until `probe` returns `Ok(true)`.
    ///
    /// `condition` names what is awaited (e.g. the transaction hash) and is
    /// carried in the [`PollError`] so a failing test can say which
    /// confirmation never arrived.
    pub async fn await_condition<F, Fut>(
        &self,
        condition: impl Into<String>,
        policy: RetryPolicy,
        probe: F,
    ) -> Result<PollOutcome, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ProbeError>>,
    {
        let mut poller = Poller::new(condition, policy)
            .with_time(self.time.clone())
            .with_probe_timeout(self.probe_timeout);
        if let Some(token) = &self.cancel {
            poller = poller.with_cancellation(token.clone());
        }
        poller.until(probe).await
    }
}
