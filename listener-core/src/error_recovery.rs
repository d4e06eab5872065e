//! Error recovery strategies for different types of errors.
//!
//! The dispatch loop asks [`ErrorRecovery::determine_strategy`] what to do
//! with a failure, startup code runs fallible operations through
//! [`ErrorRecovery::apply_strategy`], and [`Backoff`] paces reconnects to the
//! feed.

use crate::{CoreError, ErrorExt, FeedError};
use std::time::Duration;
use tracing::info;

/// Recovery strategy for handling errors
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry the operation with exponential backoff
    RetryWithBackoff {
        max_attempts: usize,
        initial_delay: Duration,
        max_delay: Duration,
    },
    /// Skip the current item and continue
    Skip,
    /// Fail immediately
    Fail,
}

/// Result of an error recovery attempt
#[derive(Debug)]
pub enum RecoveryResult<T> {
    /// Recovery was successful, operation can continue
    Recovered(T),
    /// Recovery failed, operation should be skipped
    Skipped,
    /// Recovery failed, error should be propagated
    Failed(CoreError),
}

impl<T> RecoveryResult<T> {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RecoveryResult::Recovered(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RecoveryResult::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecoveryResult::Failed(_))
    }

    /// Converts back into a plain result; a skipped operation becomes an
    /// internal error since there is no value to hand back.
    pub fn into_result(self) -> Result<T, CoreError> {
        match self {
            RecoveryResult::Recovered(value) => Ok(value),
            RecoveryResult::Skipped => Err(CoreError::Internal {
                message: "Operation skipped by recovery strategy".to_string(),
            }),
            RecoveryResult::Failed(error) => Err(error),
        }
    }
}

/// Error recovery handler that provides strategies for different error types
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            // Bad credentials or a missing/private subreddit need the operator.
            CoreError::Feed(
                FeedError::AuthenticationFailed { .. }
                | FeedError::Forbidden { .. }
                | FeedError::SubredditNotFound { .. },
            ) => RecoveryStrategy::Fail,

            CoreError::Feed(FeedError::RateLimitExceeded { retry_after }) => {
                RecoveryStrategy::RetryWithBackoff {
                    max_attempts: 2,
                    initial_delay: Duration::from_secs(*retry_after),
                    max_delay: Duration::from_secs(300),
                }
            }

            CoreError::Feed(_) | CoreError::Network(_) => RecoveryStrategy::RetryWithBackoff {
                max_attempts: 3,
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(120),
            },

            // A failed store access only costs the current item; re-delivery retries it.
            CoreError::Storage(_) => RecoveryStrategy::Skip,

            // The item stays unmarked and is retried when it shows up again.
            CoreError::Notifier(_) => RecoveryStrategy::Skip,

            CoreError::Config(_) => RecoveryStrategy::Fail,

            CoreError::Timeout { .. } => RecoveryStrategy::RetryWithBackoff {
                max_attempts: 1,
                initial_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(10),
            },

            CoreError::InvalidInput { .. } => RecoveryStrategy::Skip,

            CoreError::Internal { .. } => RecoveryStrategy::Fail,

            CoreError::Io(_) | CoreError::Serialization(_) => RecoveryStrategy::RetryWithBackoff {
                max_attempts: 3,
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
            },
        }
    }

    /// Apply the recovery strategy to an operation
    pub async fn apply_strategy<F, T, Fut>(
        strategy: RecoveryStrategy,
        mut operation: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>> + Send,
        T: Send,
    {
        match strategy {
            RecoveryStrategy::RetryWithBackoff {
                max_attempts,
                initial_delay,
                max_delay,
            } => Self::retry_with_backoff(operation, max_attempts, initial_delay, max_delay).await,
            RecoveryStrategy::Skip => RecoveryResult::Skipped,
            RecoveryStrategy::Fail => match operation().await {
                Ok(value) => RecoveryResult::Recovered(value),
                Err(error) => RecoveryResult::Failed(error),
            },
        }
    }

    /// Retry an operation with exponential backoff
    async fn retry_with_backoff<F, T, Fut>(
        mut operation: F,
        max_attempts: usize,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> RecoveryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        let mut delay = initial_delay;

        loop {
            match operation().await {
                Ok(result) => return RecoveryResult::Recovered(result),
                Err(error) => {
                    attempt += 1;

                    if attempt >= max_attempts || !error.is_retryable() {
                        return RecoveryResult::Failed(error);
                    }

                    if let Some(retry_delay) = error.retry_after() {
                        delay = delay.max(retry_delay);
                    }
                    delay = delay.min(max_delay);

                    info!(
                        "Recovery attempt {}/{} failed. Retrying after {:?}: {}",
                        attempt,
                        max_attempts,
                        delay,
                        error.user_friendly_message()
                    );

                    tokio::time::sleep(delay).await;

                    delay = std::cmp::min(delay * 2, max_delay);
                }
            }
        }
    }
}

/// Reconnect pacing for the feed.
///
/// Starting from `base`, each delay is 1.5x the current step and the step then
/// doubles, both capped at `max`: with the defaults the waits are 7.5s, 22.5s,
/// 67.5s and then 120s until [`Backoff::reset`] is called.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis((self.current.as_millis() as f64 * 1.5) as u64).min(self.max);
        self.current = (delay * 2).min(self.max);
        delay
    }

    /// Like [`Backoff::next_delay`] but never shorter than the server's hint.
    pub fn next_delay_with_hint(&mut self, hint: Option<Duration>) -> Duration {
        let delay = self.next_delay();
        match hint {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(120))
    }
}
