use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::client::ServiceError;

/// Bounded retry with exponential backoff for remote calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure, doubled for each further failure
    pub base_delay_ms: u64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
    /// Add up to 50% random extra delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

/// A value together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    pub const fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// The error that ended a retry loop and how many attempts were made.
#[derive(Debug, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryExhausted {
    pub error: ServiceError,
    pub attempts: u32,
}

impl RetryPolicy {
    /// A policy that retries immediately; used where waiting is pointless.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    /// Delay before the next attempt, given how many attempts have failed.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);

        let jitter_ms = if self.jitter && delay_ms > 1 {
            rand::rng().random_range(0..=delay_ms / 2)
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter_ms)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<Attempted<T>, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(error) if !error.is_retryable() || attempt >= max_attempts => {
                    return Err(RetryExhausted {
                        error,
                        attempts: attempt,
                    })
                }
                Err(error) => {
                    let wait = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, max_attempts, error, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
