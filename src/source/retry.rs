//! Retry-with-backoff policy shared by every request loop
//!
//! A policy bundles the attempt ceiling, the backoff base, and the predicate
//! deciding which errors are worth another attempt. Attempt `n` (zero based)
//! is followed by a wait of `base_delay * 2^n`.

use crate::config::RetryConfig;
use crate::FetchError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: fmt::Display + fmt::Debug,
{
    /// Every attempt failed with a retryable error
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The error was not retryable
    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E>
where
    E: fmt::Display + fmt::Debug,
{
    /// The last error observed
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Bounded exponential-backoff policy
pub struct RetryPolicy<E = FetchError> {
    max_attempts: u32,
    base_delay: Duration,
    retryable: fn(&E) -> bool,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for RetryPolicy<E> {}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl RetryPolicy<FetchError> {
    /// Retries connection and timeout failures only
    pub fn transient(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(max_attempts, base_delay, FetchError::is_transient)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::transient(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }
}

impl<E> RetryPolicy<E> {
    /// Creates a policy; at least one attempt is always made
    pub fn new(max_attempts: u32, base_delay: Duration, retryable: fn(&E) -> bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            retryable,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retryable)(error)
    }

    /// Backoff after the zero-based attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl<E> RetryPolicy<E>
where
    E: fmt::Display + fmt::Debug,
{
    /// Runs `operation` until it succeeds, fails fatally, or exhausts the budget
    ///
    /// Every retryable failure is followed by its backoff wait, including the
    /// last one, so callers moving on after exhaustion stay paced.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if self.is_retryable(&error) => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "{}: attempt {}/{} failed: {}; waiting {:.1}s",
                        label,
                        attempt,
                        self.max_attempts,
                        error,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;

                    if attempt >= self.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: error,
                        });
                    }
                }
                Err(error) => return Err(RetryError::Fatal(error)),
            }
        }
    }
}
