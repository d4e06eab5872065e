use listener_core::{CoreError, FeedError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Configuration for retrying a single API request
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Short in-request retries; longer outages are left to the stream backoff.
    pub fn reddit() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::Feed(feed_error) => match feed_error {
            FeedError::RateLimitExceeded { retry_after } => {
                RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
            }
            FeedError::ServerError { .. } => RetryStrategy::Retry,
            FeedError::RequestTimeout => RetryStrategy::Retry,
            FeedError::ConnectionFailed { .. } => RetryStrategy::Retry,
            FeedError::InvalidResponse { .. } => RetryStrategy::Retry,
            // The token is refreshed by the caller, not by retrying blindly.
            FeedError::InvalidToken => RetryStrategy::NoRetry,
            FeedError::AuthenticationFailed { .. } => RetryStrategy::NoRetry,
            FeedError::Forbidden { .. } => RetryStrategy::NoRetry,
            FeedError::SubredditNotFound { .. } => RetryStrategy::NoRetry,
        },
        CoreError::Network(reqwest_error) => {
            if reqwest_error.is_timeout() || reqwest_error.is_connect() {
                RetryStrategy::Retry
            } else {
                RetryStrategy::NoRetry
            }
        }
        _ => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
    let exponential_delay = Duration::from_millis(delay_ms.min(config.max_delay_ms));

    // Jitter keeps several listeners from retrying in lockstep
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

/// Runs an operation, retrying transient failures.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation with retry logic; the last error is returned
    /// unchanged when every attempt fails.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("{} succeeded after {} retries", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            attempt += 1;
            if attempt >= self.config.max_attempts {
                debug!("Max retry attempts reached for {}", operation_name);
                return Err(error);
            }

            let delay = match get_retry_strategy(&error) {
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    return Err(error);
                }
                RetryStrategy::Retry => calculate_delay(attempt - 1, &self.config),
                RetryStrategy::RetryWithDelay(delay) => delay,
            };

            info!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_config_reddit() {
        let config = RetryConfig::reddit();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 2000);
        assert_eq!(config.jitter_factor, 0.2);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        let rate_limit_error = CoreError::Feed(FeedError::RateLimitExceeded { retry_after: 60 });
        assert_eq!(
            get_retry_strategy(&rate_limit_error),
            RetryStrategy::RetryWithDelay(Duration::from_secs(60))
        );

        let auth_error = CoreError::Feed(FeedError::AuthenticationFailed {
            reason: "Invalid token".to_string(),
        });
        assert_eq!(get_retry_strategy(&auth_error), RetryStrategy::NoRetry);

        let server_error = CoreError::Feed(FeedError::ServerError { status_code: 500 });
        assert_eq!(get_retry_strategy(&server_error), RetryStrategy::Retry);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(calculate_delay(0, &config), Duration::from_millis(1000));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(2000));
        assert_eq!(calculate_delay(2, &config), Duration::from_millis(4000));
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(10000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.5,
            ..Default::default()
        };

        for _ in 0..20 {
            let delay = calculate_delay(1, &config);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[tokio::test]
    async fn test_retry_executor_success_after_retries() {
        let executor = RetryExecutor::new(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            ..Default::default()
        });
        let attempts = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute("fetch", || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CoreError::Feed(FeedError::ServerError { status_code: 502 }))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_executor_no_retry_on_auth_error() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute("fetch", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, CoreError>(CoreError::Feed(FeedError::Forbidden {
                        resource: "/r/private/new".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Feed(FeedError::Forbidden { .. }))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_executor_returns_last_error() {
        let executor = RetryExecutor::new(RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            ..Default::default()
        });

        let result = executor
            .execute("fetch", || async {
                Err::<i32, CoreError>(CoreError::Feed(FeedError::RequestTimeout))
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Feed(FeedError::RequestTimeout))
        ));
    }
}
