use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use chrono::{DateTime, Utc};
use listener_core::{CoreError, FeedError, Item};
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

impl<T> RedditListing<T> {
    pub fn into_items(self) -> Vec<T> {
        self.data.children.into_iter().map(|child| child.data).collect()
    }
}

/// A submission (`t3`) as returned by `/r/{subreddit}/new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    /// Fullname, e.g. `t3_abc123`.
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub stickied: bool,
}

/// A comment (`t1`) as returned by `/r/{subreddit}/comments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    /// Fullname, e.g. `t1_def456`.
    pub name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub link_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditUserData {
    pub id: String,
    pub name: String,
    pub created_utc: f64,
    #[serde(default)]
    pub link_karma: i32,
    #[serde(default)]
    pub comment_karma: i32,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth()));

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let waited = self.rate_limiter.acquire_permit().await;
        if !waited.is_zero() {
            debug!("Waited {:?} for rate limit permit on {}", waited, endpoint);
        }

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = request_builder.send().await.map_err(|e| {
            error!("Network error for {} {}: {}", method, endpoint, e);
            if e.is_timeout() {
                CoreError::Feed(FeedError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if let Some(feed_error) =
            status_error(status, endpoint, response.headers().get(RETRY_AFTER))
        {
            warn!("Request failed with status {} for {}", status, endpoint);
            if status == StatusCode::TOO_MANY_REQUESTS {
                let local = self.get_rate_limit_status().await;
                warn!(
                    available_tokens = local.available_tokens,
                    max_tokens = local.max_tokens,
                    requests_per_minute = local.requests_per_minute,
                    "Reddit throttled {} despite the local rate limiter",
                    endpoint
                );
            }
            return Err(feed_error.into());
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<T, CoreError> {
        let response = self
            .make_request(Method::GET, endpoint, access_token, query_params)
            .await?;

        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::Feed(FeedError::InvalidResponse {
                details: format!("Failed to parse response from {}", endpoint),
            })
        })
    }

    pub async fn get_user_info(&self, access_token: &str) -> Result<RedditUserData, CoreError> {
        let user_data: RedditUserData = self.get_json("/api/v1/me", access_token, None).await?;
        debug!("Retrieved user info for: {}", user_data.name);
        Ok(user_data)
    }

    /// Newest submissions across `subreddits` (joined with `+`), newest first.
    pub async fn get_new_submissions(
        &self,
        access_token: &str,
        subreddits: &str,
        limit: u32,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddits);
        let limit = limit.to_string();
        let params = [("limit", limit.as_str()), ("raw_json", "1")];

        let listing: RedditListing<RedditPostData> = self
            .get_json(&endpoint, access_token, Some(&params))
            .await?;

        debug!(
            "Retrieved {} submissions from r/{}",
            listing.data.children.len(),
            subreddits
        );
        Ok(listing)
    }

    /// Newest comments across `subreddits` (joined with `+`), newest first.
    pub async fn get_new_comments(
        &self,
        access_token: &str,
        subreddits: &str,
        limit: u32,
    ) -> Result<RedditListing<RedditCommentData>, CoreError> {
        let endpoint = format!("/r/{}/comments", subreddits);
        let limit = limit.to_string();
        let params = [("limit", limit.as_str()), ("raw_json", "1")];

        let listing: RedditListing<RedditCommentData> = self
            .get_json(&endpoint, access_token, Some(&params))
            .await?;

        debug!(
            "Retrieved {} comments from r/{}",
            listing.data.children.len(),
            subreddits
        );
        Ok(listing)
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

/// Maps a non-success status to the matching feed error.
pub(crate) fn status_error(
    status: StatusCode,
    endpoint: &str,
    retry_after: Option<&HeaderValue>,
) -> Option<FeedError> {
    if status.is_success() {
        return None;
    }

    let error = match status.as_u16() {
        401 => FeedError::InvalidToken,
        403 => FeedError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => FeedError::SubredditNotFound {
            subreddit: subreddit_of(endpoint).to_string(),
        },
        429 => {
            let retry_after = retry_after
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            info!("Rate limited, retry after {} seconds", retry_after);
            FeedError::RateLimitExceeded { retry_after }
        }
        code if status.is_server_error() => FeedError::ServerError { status_code: code },
        code => FeedError::InvalidResponse {
            details: format!("Unexpected status {} from {}", code, endpoint),
        },
    };

    Some(error)
}

fn subreddit_of(endpoint: &str) -> &str {
    endpoint
        .strip_prefix("/r/")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(endpoint)
}

fn timestamp(created_utc: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(created_utc as i64, 0).unwrap_or_default()
}

impl From<RedditPostData> for Item {
    fn from(post: RedditPostData) -> Self {
        let selftext = if post.is_self && !post.selftext.is_empty() {
            Some(post.selftext)
        } else {
            None
        };

        Item::submission(
            post.name,
            post.title,
            selftext,
            post.subreddit,
            post.permalink,
            timestamp(post.created_utc),
        )
    }
}

impl From<RedditCommentData> for Item {
    fn from(comment: RedditCommentData) -> Self {
        Item::comment(
            comment.name,
            comment.body,
            comment.subreddit,
            comment.permalink,
            timestamp(comment.created_utc),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listener_core::ItemKind;

    #[tokio::test]
    async fn test_api_client_creation() {
        let client = RedditApiClient::new("test-user-agent/1.0".to_string()).unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");

        let status = client.get_rate_limit_status().await;
        assert!(status.available_tokens > 0);
    }

    #[test]
    fn test_status_mapping() {
        let endpoint = "/r/rust+programming/new";

        assert!(status_error(StatusCode::OK, endpoint, None).is_none());
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, endpoint, None),
            Some(FeedError::InvalidToken)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, endpoint, None),
            Some(FeedError::Forbidden { .. })
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, endpoint, None),
            Some(FeedError::ServerError { status_code: 502 })
        ));

        match status_error(StatusCode::NOT_FOUND, endpoint, None) {
            Some(FeedError::SubredditNotFound { subreddit }) => {
                assert_eq!(subreddit, "rust+programming")
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_honours_retry_after() {
        let header = HeaderValue::from_static("12");
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "/r/rust/new", Some(&header)),
            Some(FeedError::RateLimitExceeded { retry_after: 12 })
        ));

        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "/r/rust/new", None),
            Some(FeedError::RateLimitExceeded { retry_after: 60 })
        ));
    }

    #[test]
    fn test_post_conversion() {
        let json = r#"{
            "id": "abc123",
            "name": "t3_abc123",
            "title": "Big SALE today",
            "selftext": "Everything must go",
            "author": "seller",
            "subreddit": "deals",
            "permalink": "/r/deals/comments/abc123/big_sale_today/",
            "created_utc": 1700000000.0,
            "is_self": true
        }"#;
        let post: RedditPostData = serde_json::from_str(json).unwrap();
        let item = Item::from(post);

        assert_eq!(item.id, "t3_abc123");
        assert_eq!(item.kind, ItemKind::Submission);
        assert_eq!(item.title.as_deref(), Some("Big SALE today"));
        assert_eq!(item.text.as_deref(), Some("Big SALE today\nEverything must go"));
        assert_eq!(item.source_channel, "deals");
        assert_eq!(item.created_at.timestamp(), 1_700_000_000);
        assert_eq!(
            item.url(),
            "https://www.reddit.com/r/deals/comments/abc123/big_sale_today/"
        );
    }

    #[test]
    fn test_link_post_ignores_selftext() {
        let json = r#"{
            "id": "lnk1",
            "name": "t3_lnk1",
            "title": "An article",
            "selftext": "",
            "subreddit": "news",
            "permalink": "/r/news/comments/lnk1/an_article/",
            "created_utc": 1700000000.0,
            "is_self": false
        }"#;
        let post: RedditPostData = serde_json::from_str(json).unwrap();
        let item = Item::from(post);

        assert_eq!(item.text.as_deref(), Some("An article"));
    }

    #[test]
    fn test_comment_conversion() {
        let json = r#"{
            "id": "def456",
            "name": "t1_def456",
            "body": "Has anyone tried the new release?",
            "author": "someone",
            "subreddit": "rust",
            "permalink": "/r/rust/comments/abc123/title/def456/",
            "created_utc": 1700000100.0,
            "link_title": "Release thread"
        }"#;
        let comment: RedditCommentData = serde_json::from_str(json).unwrap();
        let item = Item::from(comment);

        assert_eq!(item.id, "t1_def456");
        assert_eq!(item.kind, ItemKind::Comment);
        assert!(item.title.is_none());
        assert_eq!(item.text.as_deref(), Some("Has anyone tried the new release?"));
    }

    #[test]
    fn test_listing_into_items() {
        let json = r#"{
            "kind": "Listing",
            "data": {
                "after": null,
                "before": null,
                "children": [
                    {"kind": "t1", "data": {"id": "a", "name": "t1_a", "body": "x",
                     "subreddit": "rust", "permalink": "/r/rust/a", "created_utc": 2.0}},
                    {"kind": "t1", "data": {"id": "b", "name": "t1_b", "body": null,
                     "subreddit": "rust", "permalink": "/r/rust/b", "created_utc": 1.0}}
                ]
            }
        }"#;
        let listing: RedditListing<RedditCommentData> = serde_json::from_str(json).unwrap();
        let comments = listing.into_items();

        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].name, "t1_a");
        assert!(comments[1].body.is_none());
    }
}
