use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listener_core::{CoreError, Disposition, SeenRecord, SeenStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Seen-set that lives only as long as the process.
///
/// Used for dry runs and as the store substitute in tests.
#[derive(Debug, Default)]
pub struct MemorySeenStore {
    records: RwLock<HashMap<String, SeenRecord>>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn has_seen(&self, id: &str) -> Result<bool, CoreError> {
        Ok(self.records.read().await.contains_key(id))
    }

    async fn mark_seen(
        &self,
        id: &str,
        seen_at: DateTime<Utc>,
        disposition: Disposition,
    ) -> Result<(), CoreError> {
        self.records
            .write()
            .await
            .entry(id.to_string())
            .or_insert_with(|| SeenRecord {
                id: id.to_string(),
                disposition,
                first_seen_at: seen_at,
            });
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SeenRecord>, CoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn count(&self) -> Result<u64, CoreError> {
        Ok(self.records.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_seen_is_idempotent() {
        let store = MemorySeenStore::new();
        let first = Utc::now();

        assert!(!store.has_seen("t3_a").await.unwrap());
        store.mark_seen("t3_a", first, Disposition::Notified).await.unwrap();
        store
            .mark_seen("t3_a", first + chrono::Duration::seconds(5), Disposition::Ignored)
            .await
            .unwrap();

        let record = store.get("t3_a").await.unwrap().unwrap();
        assert_eq!(record.disposition, Disposition::Notified);
        assert_eq!(record.first_seen_at, first);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
