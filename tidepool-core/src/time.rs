//! Time provider abstraction for polling loops.
//!
//! Every sleep and every elapsed-time measurement in tidepool goes through
//! [`TimeProvider`], so the same retry discipline runs against wall-clock time
//! in a real test network and against a paused Tokio clock in unit tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during time operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The operation timed out.
    #[error("operation timed out")]
    Elapsed,
}

/// Provider trait for time operations.
///
/// ## Time Semantics
///
/// - `now()`: elapsed time since the provider was created. Only differences
///   between two readings are meaningful.
/// - `sleep()`: suspends the current task; under a paused Tokio clock this
///   advances virtual time instead of blocking.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Get the current time, relative to the provider's creation.
    fn now(&self) -> Duration;

    /// Run a future with a timeout.
    ///
    /// Returns `Ok(result)` if the future completes within the timeout,
    /// or `Err(TimeError::Elapsed)` if it times out.
    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, TimeError>
    where
        F: std::future::Future<Output = T>;
}

/// Real time provider using Tokio's time facilities.
///
/// Uses [`tokio::time::Instant`] rather than the std clock so that a paused
/// runtime (`#[tokio::test(start_paused = true)]`) reports virtual time.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    start_time: tokio::time::Instant,
}

impl TokioTimeProvider {
    /// Create a new Tokio time provider.
    pub fn new() -> Self {
        Self {
            start_time: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Duration {
        self.start_time.elapsed()
    }

    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, TimeError>
    where
        F: std::future::Future<Output = T>,
    {
        match tokio::time::timeout(duration, future).await {
            Ok(result) => Ok(result),
            Err(_) => Err(TimeError::Elapsed),
        }
    }
}
