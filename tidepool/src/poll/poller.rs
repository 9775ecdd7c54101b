//! The shared retry loop behind health checks and confirmation polls.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{RetryPolicy, TimeProvider, TokioTimeProvider};

/// Failure reported by a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The probe could not answer this time; treated as "not yet" and retried.
    #[error("{0}")]
    Transient(String),

    /// The probe can never succeed; polling stops on this attempt.
    #[error("{0}")]
    Fatal(String),
}

impl ProbeError {
    /// Wrap an error that should be retried.
    pub fn transient(err: impl std::fmt::Display) -> Self {
        Self::Transient(err.to_string())
    }

    /// Wrap an error that should end the poll.
    pub fn fatal(err: impl std::fmt::Display) -> Self {
        Self::Fatal(err.to_string())
    }

    /// Whether the poller keeps going after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Terminal failure of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// Every attempt in the budget failed.
    #[error(
        "'{label}' not satisfied after {attempts} attempt(s) in {elapsed:?} (last probe error: {})",
        .last_error.as_deref().unwrap_or("none")
    )]
    Timeout {
        /// What was being polled.
        label: String,
        /// Attempts made, equal to the policy's maximum.
        attempts: u32,
        /// Time from the first attempt to giving up.
        elapsed: Duration,
        /// Message of the most recent transient probe error, if any.
        last_error: Option<String>,
    },

    /// The surrounding test cancelled the wait.
    #[error("'{label}' cancelled after {attempts} attempt(s) in {elapsed:?}")]
    Cancelled {
        /// What was being polled.
        label: String,
        /// Attempts completed before cancellation.
        attempts: u32,
        /// Time from the first attempt to cancellation.
        elapsed: Duration,
    },

    /// The probe reported a non-retryable failure.
    #[error("'{label}' failed permanently on attempt {attempt}")]
    Fatal {
        /// What was being polled.
        label: String,
        /// Attempt on which the probe failed.
        attempt: u32,
        /// The probe's error.
        #[source]
        source: ProbeError,
    },
}

impl PollError {
    /// Number of attempts made before the poll ended.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
            Self::Fatal { attempt, .. } => *attempt,
        }
    }

    /// Whether this is a plain budget exhaustion.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Successful end of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Attempt on which the probe first succeeded (1-based).
    pub attempts: u32,
    /// Time from the first attempt to success.
    pub elapsed: Duration,
}

impl PollOutcome {
    /// Failed attempts before success.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Longest a single probe call may run before it counts as a failed attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded-retry scheduler, independent of what is being probed.
#[derive(Debug, Clone)]
pub struct Poller<T: TimeProvider = TokioTimeProvider> {
    label: String,
    policy: RetryPolicy,
    time: T,
    cancel: Option<CancellationToken>,
    probe_timeout: Duration,
}

impl Poller<TokioTimeProvider> {
    /// Poller on Tokio time.
    pub fn new(label: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            label: label.into(),
            policy,
            time: TokioTimeProvider::new(),
            cancel: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl<T: TimeProvider> Poller<T> {
    /// Use a different time provider.
    pub fn with_time<U: TimeProvider>(self, time: U) -> Poller<U> {
        Poller {
            label: self.label,
            policy: self.policy,
            time,
            cancel: self.cancel,
            probe_timeout: self.probe_timeout,
        }
    }

    /// Abort the poll as soon as `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Treat a probe that runs longer than `limit` as a transient failure.
    ///
    /// Defaults to [`DEFAULT_PROBE_TIMEOUT`].
    pub fn with_probe_timeout(mut self, limit: Duration) -> Self {
        self.probe_timeout = limit;
        self
    }

    /// What this poller reports in its errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The retry budget.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `probe` until it returns `Ok(true)` or the budget runs out.
    ///
    /// `Ok(false)` and [`ProbeError::Transient`] both count as "not yet".
    /// [`ProbeError::Fatal`] stops immediately. Sleeps happen only between
    /// attempts, so a never-true probe is called exactly `max_attempts` times.
    pub async fn until<F, Fut>(&self, mut probe: F) -> Result<PollOutcome, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ProbeError>>,
    {
        let start = self.time.now();
        let max_attempts = self.policy.max_attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let limit = self.probe_timeout;
            let call = async {
                self.time
                    .timeout(limit, probe())
                    .await
                    .unwrap_or_else(|_| Err(ProbeError::transient(format!("probe timed out after {limit:?}"))))
            };
            let result = match &self.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(self.cancelled(attempt - 1, start)),
                    result = call => result,
                },
                None => call.await,
            };

            match result {
                Ok(true) => {
                    let outcome = PollOutcome {
                        attempts: attempt,
                        elapsed: self.time.now().saturating_sub(start),
                    };
                    tracing::debug!(
                        label = %self.label,
                        attempts = outcome.attempts,
                        elapsed = ?outcome.elapsed,
                        "condition satisfied"
                    );
                    return Ok(outcome);
                }
                Ok(false) => {
                    tracing::trace!(label = %self.label, attempt, "condition not yet satisfied");
                }
                Err(source @ ProbeError::Fatal(_)) => {
                    tracing::warn!(label = %self.label, attempt, error = %source, "probe failed permanently");
                    return Err(PollError::Fatal {
                        label: self.label.clone(),
                        attempt,
                        source,
                    });
                }
                Err(err) => {
                    tracing::debug!(label = %self.label, attempt, error = %err, "probe failed, will retry");
                    last_error = Some(err.to_string());
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.delay_after(attempt);
                match &self.cancel {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(self.cancelled(attempt, start)),
                        _ = self.time.sleep(delay) => {}
                    },
                    None => self.time.sleep(delay).await,
                }
            }
        }

        let elapsed = self.time.now().saturating_sub(start);
        tracing::warn!(
            label = %self.label,
            attempts = max_attempts,
            elapsed = ?elapsed,
            "retry budget exhausted"
        );
        Err(PollError::Timeout {
            label: self.label.clone(),
            attempts: max_attempts,
            elapsed,
            last_error,
        })
    }

    fn cancelled(&self, attempts: u32, start: Duration) -> PollError {
        let elapsed = self.time.now().saturating_sub(start);
        tracing::debug!(label = %self.label, attempts, elapsed = ?elapsed, "poll cancelled");
        PollError::Cancelled {
            label: self.label.clone(),
            attempts,
            elapsed,
        }
    }
}
