//! Bounded retry budgets.
//!
//! A [`RetryPolicy`] is a maximum attempt count plus the delay between
//! attempts. Health checks and confirmation polls both consume one, and
//! exhausting it is always a terminal failure: nothing in tidepool waits
//! without a bound.
//!
//! ```
//! use std::num::NonZeroU32;
//! use std::time::Duration;
//! use tidepool_core::RetryPolicy;
//!
//! let policy = RetryPolicy::fixed(NonZeroU32::new(3).unwrap(), Duration::from_secs(1));
//! // Two sleeps: after attempt 1 and after attempt 2, never after the last one.
//! assert_eq!(policy.worst_case_wait(), Duration::from_secs(2));
//! ```

use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the inter-attempt delay evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Every sleep lasts exactly the base delay.
    #[default]
    Fixed,
    /// The delay doubles after each failed attempt, capped at `max_delay`.
    Exponential {
        /// Upper bound for a single sleep.
        #[serde(rename = "max_delay_ms", with = "millis")]
        max_delay: Duration,
    },
}

/// Errors from building a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryPolicyError {
    /// A policy must allow at least one attempt.
    #[error("retry policy needs at least one attempt")]
    ZeroAttempts,
}

/// Bounded attempt count plus inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    #[serde(rename = "delay_ms", with = "millis")]
    delay: Duration,
    #[serde(default)]
    backoff: Backoff,
}

impl RetryPolicy {
    /// Policy with a constant delay between attempts.
    pub const fn fixed(max_attempts: NonZeroU32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Policy whose delay starts at `initial` and doubles up to `max_delay`.
    pub const fn exponential(max_attempts: NonZeroU32, initial: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay: initial,
            backoff: Backoff::Exponential { max_delay },
        }
    }

    /// Fixed-delay policy from a plain attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError::ZeroAttempts`] when `max_attempts` is 0.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, RetryPolicyError> {
        let max_attempts = NonZeroU32::new(max_attempts).ok_or(RetryPolicyError::ZeroAttempts)?;
        Ok(Self::fixed(max_attempts, delay))
    }

    /// Waiting for a freshly created peer node: 30 polls, 5 s apart.
    pub const fn node_startup() -> Self {
        Self::fixed(nonzero(30), Duration::from_secs(5))
    }

    /// Waiting for a lightweight service container: 15 polls, 1 s apart.
    pub const fn service_startup() -> Self {
        Self::fixed(nonzero(15), Duration::from_secs(1))
    }

    /// Waiting for a submitted transaction to be mined: 10 polls, 1 s apart.
    pub const fn transaction_mined() -> Self {
        Self::fixed(nonzero(10), Duration::from_secs(1))
    }

    /// Maximum number of attempts, always at least 1.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Base delay between attempts.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Backoff mode.
    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(max_delay)
            }
        }
    }

    /// Total time spent sleeping if every attempt fails.
    ///
    /// There is no sleep after the final attempt.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts())
            .map(|attempt| self.delay_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

const fn nonzero(n: u32) -> NonZeroU32 {
    match NonZeroU32::new(n) {
        Some(n) => n,
        None => panic!("retry presets use non-zero attempt counts"),
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
