//! Polling adapter that turns the `/new` and `/comments` listings of a set of
//! subreddits into a single pull-based item stream.

use crate::api::{RedditApiClient, RedditUserData};
use crate::auth::{RedditAuthenticator, RedditToken};
use crate::retry::{RetryConfig, RetryExecutor};
use async_trait::async_trait;
use listener_core::{CoreError, FeedError, FeedSource, Item, RedditConfig, RedditCredentials};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Ids remembered per listing so overlapping polls don't repeat items.
pub const RECENT_IDS_CAPACITY: usize = 301;

#[derive(Debug, Clone)]
pub struct RedditFeedConfig {
    pub subreddits: Vec<String>,
    pub fetch_limit: u32,
    /// Drop whatever is already listed on the first poll.
    pub skip_existing: bool,
}

impl RedditFeedConfig {
    pub fn from_config(config: &RedditConfig) -> Self {
        Self {
            subreddits: config.channels(),
            fetch_limit: config.fetch_limit,
            skip_existing: config.skip_existing,
        }
    }
}

/// Bounded insertion-ordered set; the oldest id is evicted first.
#[derive(Debug)]
pub(crate) struct RecentIds {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `false` if `id` was already present.
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }

        self.order.push_back(id.to_string());
        self.members.insert(id.to_string());
        true
    }

    /// Returns `false` if `id` was not present.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        self.order.retain(|recent| recent != id);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}

/// Per-listing state: which ids were already yielded, and whether the
/// listing has been polled at least once.
#[derive(Debug)]
pub(crate) struct ListingCursor {
    recent: RecentIds,
    primed: bool,
}

impl ListingCursor {
    pub(crate) fn new() -> Self {
        Self {
            recent: RecentIds::new(RECENT_IDS_CAPACITY),
            primed: false,
        }
    }

    /// Takes a newest-first listing and returns the unseen items oldest-first.
    pub(crate) fn admit(&mut self, newest_first: Vec<Item>, skip_existing: bool) -> Vec<Item> {
        let suppress = skip_existing && !self.primed;
        self.primed = true;

        newest_first
            .into_iter()
            .rev()
            .filter(|item| self.recent.insert(&item.id))
            .filter(|_| !suppress)
            .collect()
    }

    /// Forgets `id` so the next listing that contains it admits it again.
    pub(crate) fn release(&mut self, id: &str) -> bool {
        self.recent.remove(id)
    }
}

pub struct RedditFeed {
    api: RedditApiClient,
    authenticator: RedditAuthenticator,
    retry: RetryExecutor,
    token: Option<RedditToken>,
    subreddits: String,
    fetch_limit: u32,
    skip_existing: bool,
    submissions: ListingCursor,
    comments: ListingCursor,
    pending: VecDeque<Item>,
    name: String,
}

impl RedditFeed {
    pub fn new(credentials: &RedditCredentials, config: RedditFeedConfig) -> Result<Self, CoreError> {
        if config.subreddits.is_empty() {
            return Err(CoreError::InvalidInput {
                message: "at least one subreddit is required".to_string(),
            });
        }

        let subreddits = config.subreddits.join("+");
        Ok(Self {
            api: RedditApiClient::new(credentials.user_agent.clone())?,
            authenticator: RedditAuthenticator::new(credentials)?,
            retry: RetryExecutor::new(RetryConfig::reddit()),
            token: None,
            name: format!("reddit:r/{}", subreddits),
            subreddits,
            fetch_limit: config.fetch_limit,
            skip_existing: config.skip_existing,
            submissions: ListingCursor::new(),
            comments: ListingCursor::new(),
            pending: VecDeque::new(),
        })
    }

    /// Authenticates and checks the credentials against `/api/v1/me`.
    /// The returned token is installed with [`RedditFeed::set_token`].
    pub async fn login(&self) -> Result<(RedditToken, RedditUserData), CoreError> {
        let token = self.authenticator.authenticate().await?;
        let user = self.api.get_user_info(&token.access_token).await?;
        info!("Authenticated with Reddit as u/{}", user.name);
        Ok((token, user))
    }

    pub fn set_token(&mut self, token: RedditToken) {
        self.token = Some(token);
    }

    async fn refresh_token(&mut self) -> Result<String, CoreError> {
        let token = self.authenticator.authenticate().await?;
        let access_token = token.access_token.clone();
        self.token = Some(token);
        Ok(access_token)
    }

    async fn access_token(&mut self) -> Result<String, CoreError> {
        if let Some(token) = &self.token {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Access token missing or about to expire, re-authenticating");
        self.refresh_token().await
    }

    fn forget_token_on(&mut self, error: &CoreError) {
        if matches!(error, CoreError::Feed(FeedError::InvalidToken)) {
            warn!("Reddit rejected the access token, will re-authenticate");
            self.token = None;
        }
    }

    /// Fetches both listings and queues whatever is new.
    async fn poll(&mut self) -> Result<(), CoreError> {
        let token = self.access_token().await?;

        let submissions = self
            .retry
            .execute("fetch new submissions", || {
                self.api
                    .get_new_submissions(&token, &self.subreddits, self.fetch_limit)
            })
            .await;
        let submissions = match submissions {
            Ok(listing) => listing.into_items(),
            Err(e) => {
                self.forget_token_on(&e);
                return Err(e);
            }
        };
        let submissions = self
            .submissions
            .admit(submissions.into_iter().map(Item::from).collect(), self.skip_existing);

        let comments = self
            .retry
            .execute("fetch new comments", || {
                self.api
                    .get_new_comments(&token, &self.subreddits, self.fetch_limit)
            })
            .await;
        let comments = match comments {
            Ok(listing) => listing.into_items(),
            Err(e) => {
                self.forget_token_on(&e);
                // Submissions already admitted are still delivered.
                self.pending.extend(submissions);
                return Err(e);
            }
        };
        let comments = self
            .comments
            .admit(comments.into_iter().map(Item::from).collect(), self.skip_existing);

        if !submissions.is_empty() || !comments.is_empty() {
            debug!(
                "Queued {} new submissions and {} new comments from r/{}",
                submissions.len(),
                comments.len(),
                self.subreddits
            );
        }

        self.pending.extend(submissions);
        self.pending.extend(comments);
        Ok(())
    }
}

#[async_trait]
impl FeedSource for RedditFeed {
    async fn next_item(&mut self) -> Result<Option<Item>, CoreError> {
        if let Some(item) = self.pending.pop_front() {
            return Ok(Some(item));
        }

        self.poll().await?;
        Ok(self.pending.pop_front())
    }

    fn release(&mut self, id: &str) {
        if self.submissions.release(id) || self.comments.release(id) {
            debug!("Released {} for re-delivery", id);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
