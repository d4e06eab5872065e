pub mod api;
pub mod auth;
pub mod rate_limiter;
pub mod retry;
pub mod stream;

#[cfg(test)]
mod tests;

pub use api::{RedditApiClient, RedditCommentData, RedditListing, RedditPostData, RedditUserData};
pub use auth::{RedditAuthenticator, RedditToken};
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor, RetryStrategy};
pub use stream::{RedditFeed, RedditFeedConfig};
