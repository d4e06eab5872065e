//! The stream consumer: novelty check, keyword match, notify, record.

use chrono::Utc;
use listener_core::{
    AppConfig, Backoff, CoreError, Disposition, ErrorExt, ErrorRecovery, FeedError, FeedSource,
    Item, KeywordMatcher, MatchEvent, Notifier, NotifierError, RecoveryStrategy, SeenStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySeen,
    NoMatch,
}

/// What happened to a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Skipped(SkipReason),
    Notified { keyword: String },
    /// Left unrecorded so a later delivery tries again.
    NotifyFailed { keyword: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub items_received: u64,
    pub skipped_seen: u64,
    pub skipped_no_match: u64,
    pub notified: u64,
    pub notify_failures: u64,
    pub storage_errors: u64,
    pub feed_errors: u64,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Sleep after the feed reports nothing new.
    pub poll_interval: Duration,
    pub notify_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            notify_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(120),
        }
    }
}

impl DispatchConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.reddit.poll_interval(),
            notify_timeout: config.notifier.timeout(),
            ..Default::default()
        }
    }
}

pub struct DispatchLoop {
    feed: Box<dyn FeedSource>,
    store: Arc<dyn SeenStore>,
    matcher: KeywordMatcher,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
    backoff: Backoff,
    stats: DispatchStats,
}

impl DispatchLoop {
    pub fn new(
        feed: Box<dyn FeedSource>,
        store: Arc<dyn SeenStore>,
        matcher: KeywordMatcher,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Self {
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);
        Self {
            feed,
            store,
            matcher,
            notifier,
            config,
            backoff,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Runs one item through the pipeline.
    ///
    /// A storage failure aborts the item and is returned; nothing is recorded
    /// for it, so a re-delivery starts over.
    pub async fn process_item(&mut self, item: Item) -> Result<ItemOutcome, CoreError> {
        self.stats.items_received += 1;

        if self.store.has_seen(&item.id).await? {
            debug!("Skipping {} {}: already seen", item.kind, item.id);
            self.stats.skipped_seen += 1;
            return Ok(ItemOutcome::Skipped(SkipReason::AlreadySeen));
        }

        let keyword = match self.matcher.matches(item.text.as_deref()) {
            Some(keyword) => keyword.to_string(),
            None => {
                self.store
                    .mark_seen(&item.id, Utc::now(), Disposition::Ignored)
                    .await?;
                debug!("Skipping {} {}: no keyword", item.kind, item.id);
                self.stats.skipped_no_match += 1;
                return Ok(ItemOutcome::Skipped(SkipReason::NoMatch));
            }
        };

        let item_id = item.id.clone();
        let event = MatchEvent::new(item, keyword.clone());

        let delivered = match timeout(self.config.notify_timeout, self.notifier.send(&event)).await
        {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout {
                notifier: self.notifier.name().to_string(),
                seconds: self.config.notify_timeout.as_secs(),
            }
            .into()),
        };

        if let Err(e) = delivered {
            e.log_warn();
            warn!(
                "Notification for {} (keyword \"{}\") failed, will retry on re-delivery",
                item_id, keyword
            );
            self.stats.notify_failures += 1;
            return Ok(ItemOutcome::NotifyFailed { keyword });
        }

        self.store
            .mark_seen(&item_id, Utc::now(), Disposition::Notified)
            .await?;
        self.stats.notified += 1;
        info!("Notified {} via {} (keyword \"{}\")", item_id, self.notifier.name(), keyword);

        Ok(ItemOutcome::Notified { keyword })
    }

    /// Consumes the feed until `shutdown` turns `true` (or its sender is
    /// dropped). Shutdown is observed between items and while waiting on the
    /// feed or sleeping, never in the middle of an item.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DispatchStats {
        info!(
            "Dispatch loop started on {} with {} keywords",
            self.feed.name(),
            self.matcher.keywords().len()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                next = self.feed.next_item() => next,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            match next {
                Ok(Some(item)) => {
                    self.backoff.reset();
                    let item_id = item.id.clone();
                    match self.process_item(item).await {
                        Ok(ItemOutcome::NotifyFailed { .. }) => self.feed.release(&item_id),
                        Ok(_) => {}
                        Err(e) => {
                            self.stats.storage_errors += 1;
                            e.log_error();
                            self.feed.release(&item_id);
                        }
                    }
                }
                Ok(None) => {
                    self.backoff.reset();
                    if sleep_or_shutdown(self.config.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    self.stats.feed_errors += 1;
                    let delay = match ErrorRecovery::determine_strategy(&e) {
                        RecoveryStrategy::Fail => {
                            e.log_error();
                            self.backoff.max_delay()
                        }
                        _ => {
                            e.log_warn();
                            self.backoff.next_delay_with_hint(rate_limit_hint(&e))
                        }
                    };
                    warn!("Feed {} failed, retrying in {:?}", self.feed.name(), delay);
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        let stats = self.stats;
        info!(
            received = stats.items_received,
            notified = stats.notified,
            notify_failures = stats.notify_failures,
            skipped_seen = stats.skipped_seen,
            skipped_no_match = stats.skipped_no_match,
            storage_errors = stats.storage_errors,
            feed_errors = stats.feed_errors,
            "Dispatch loop stopped"
        );
        stats
    }
}

/// Only an explicit rate limit stretches the backoff.
fn rate_limit_hint(error: &CoreError) -> Option<Duration> {
    match error {
        CoreError::Feed(FeedError::RateLimitExceeded { .. }) => error.retry_after(),
        _ => None,
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Returns `true` if shutdown was requested before `delay` elapsed.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(delay) => false,
        _ = shutdown_requested(shutdown) => true,
    }
}
