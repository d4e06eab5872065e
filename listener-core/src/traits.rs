//! Collaborator interfaces the dispatch loop is built against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{CoreError, Disposition, Item, MatchEvent, SeenRecord};

/// Pull interface over an unbounded, restartable stream of items.
///
/// Items may be delivered more than once, across polls or across restarts.
#[async_trait]
pub trait FeedSource: Send {
    /// Next item, or `Ok(None)` when nothing new is available right now.
    async fn next_item(&mut self) -> Result<Option<Item>, CoreError>;

    /// Hands back an item that was delivered but left unrecorded, so a later
    /// poll that still lists it delivers it again.
    fn release(&mut self, _id: &str) {}

    fn name(&self) -> &str;
}

/// Durable record of item ids that have already been processed.
///
/// Implementations are safe to share between tasks, but the check in
/// [`SeenStore::has_seen`] followed by [`SeenStore::mark_seen`] is not atomic:
/// a single consumer per store is assumed.
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn has_seen(&self, id: &str) -> Result<bool, CoreError>;

    /// Records `id`. Marking an id that is already present leaves the
    /// existing record untouched.
    async fn mark_seen(
        &self,
        id: &str,
        seen_at: DateTime<Utc>,
        disposition: Disposition,
    ) -> Result<(), CoreError>;

    async fn get(&self, id: &str) -> Result<Option<SeenRecord>, CoreError>;

    async fn count(&self) -> Result<u64, CoreError>;
}

/// Delivers an alert for a matched item.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &MatchEvent) -> Result<(), CoreError>;

    fn name(&self) -> &str;
}
