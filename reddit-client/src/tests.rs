#[cfg(test)]
mod tests {
    use crate::{
        api, rate_limiter, RedditAuthenticator, RedditFeed, RedditFeedConfig, RetryConfig,
        RetryExecutor,
    };
    use listener_core::{
        CoreError, FeedError, FeedSource, Item, ItemKind, KeywordMatcher, KeywordSet, MatchMode,
        RedditConfig, RedditCredentials,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn create_test_credentials() -> RedditCredentials {
        RedditCredentials {
            client_id: "test_client_id".to_string(),
            client_secret: "test_client_secret".to_string(),
            user_agent: "reddit-listener/0.1 by test_user".to_string(),
            username: "test_user".to_string(),
            password: "test_password".to_string(),
        }
    }

    #[test]
    fn test_authenticator_from_config() {
        let config = RedditConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            user_agent: Some("reddit-listener/0.1".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        };

        let credentials = config.credentials().unwrap();
        assert!(RedditAuthenticator::new(&credentials).is_ok());
    }

    #[test]
    fn test_feed_config_from_reddit_config() {
        let config = RedditConfig {
            subreddits: vec!["r/rust".to_string(), "programming".to_string()],
            fetch_limit: 50,
            skip_existing: true,
            ..Default::default()
        };

        let feed_config = RedditFeedConfig::from_config(&config);
        assert_eq!(feed_config.subreddits, vec!["rust", "programming"]);
        assert_eq!(feed_config.fetch_limit, 50);
        assert!(feed_config.skip_existing);

        let feed = RedditFeed::new(&create_test_credentials(), feed_config).unwrap();
        assert_eq!(feed.name(), "reddit:r/rust+programming");
    }

    #[test]
    fn test_converted_items_flow_through_matcher() {
        let post: api::RedditPostData = serde_json::from_str(
            r#"{
                "id": "p1",
                "name": "t3_p1",
                "title": "Looking for a Rust mentor",
                "selftext": "",
                "subreddit": "rust",
                "permalink": "/r/rust/comments/p1/looking_for_a_rust_mentor/",
                "created_utc": 1700000000.0,
                "is_self": true
            }"#,
        )
        .unwrap();
        let comment: api::RedditCommentData = serde_json::from_str(
            r#"{
                "id": "c1",
                "name": "t1_c1",
                "body": "[deleted]",
                "subreddit": "rust",
                "permalink": "/r/rust/comments/p1/x/c1/",
                "created_utc": 1700000001.0
            }"#,
        )
        .unwrap();

        let matcher = KeywordMatcher::new(KeywordSet::new(["mentor"]), MatchMode::Substring);

        let post = Item::from(post);
        assert_eq!(post.kind, ItemKind::Submission);
        assert_eq!(matcher.matches(post.text.as_deref()), Some("mentor"));

        let comment = Item::from(comment);
        assert_eq!(comment.kind, ItemKind::Comment);
        assert_eq!(matcher.matches(comment.text.as_deref()), None);
    }

    #[test]
    fn test_retry_gives_up_on_invalid_token() {
        let executor = RetryExecutor::new(RetryConfig::reddit());
        let attempts = Arc::new(AtomicU32::new(0));

        let result = tokio_test::block_on(executor.execute("fetch new comments", || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), CoreError>(FeedError::InvalidToken.into())
            }
        }));

        assert!(matches!(
            result,
            Err(CoreError::Feed(FeedError::InvalidToken))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limiter_status() {
        let config = rate_limiter::RateLimitConfig::reddit_oauth();
        let limiter = rate_limiter::RateLimiter::new(config);

        let status = limiter.get_rate_limit_status().await;
        assert!(status.available_tokens > 0);
        assert_eq!(status.max_tokens, 10);
        assert_eq!(status.requests_per_minute, 100);
    }

    #[tokio::test]
    async fn test_rate_limiter_permits() {
        let config = rate_limiter::RateLimitConfig::reddit_oauth();
        let limiter = rate_limiter::RateLimiter::new(config);

        limiter.acquire_permit().await;

        let status = limiter.get_rate_limit_status().await;
        assert!(status.available_tokens < 10);
    }
}
