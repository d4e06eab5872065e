//! Durable seen-set backed by SQLite.
//!
//! Every [`SeenStore::mark_seen`] is one `INSERT OR IGNORE` statement, so an
//! id keeps the record written the first time it was observed and a failed
//! write never leaves another id half-recorded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listener_core::{CoreError, Disposition, SeenRecord, SeenStore, StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

mod memory;
#[cfg(test)]
mod tests;

pub use memory::MemorySeenStore;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| StorageError::ConnectionFailed {
                reason: format!("{}: {}", self.connection_string, e),
            })?
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database.
        let in_memory = self.connection_string.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to seen-item database at {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .map_err(|e| StorageError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Seen-item database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }

    fn pool(&self) -> Result<&SqlitePool, StorageError> {
        self.pool.as_ref().ok_or_else(|| StorageError::ConnectionFailed {
            reason: "database is not connected".to_string(),
        })
    }
}

fn storage_error(error: sqlx::Error) -> StorageError {
    let primary_code = error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff);

    match primary_code {
        Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => StorageError::DatabaseLocked,
        _ => StorageError::Sql(error),
    }
}

#[async_trait]
impl SeenStore for Database {
    async fn has_seen(&self, id: &str) -> Result<bool, CoreError> {
        let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM seen_items WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(storage_error)?;
        Ok(row.is_some())
    }

    async fn mark_seen(
        &self,
        id: &str,
        seen_at: DateTime<Utc>,
        disposition: Disposition,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO seen_items (id, disposition, first_seen_at) VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(disposition.as_str())
        .bind(seen_at.timestamp_millis())
        .execute(self.pool()?)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            debug!("Item {} was already recorded, keeping the first record", id);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SeenRecord>, CoreError> {
        let row = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT id, disposition, first_seen_at FROM seen_items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool()?)
        .await
        .map_err(storage_error)?;

        let Some((id, disposition, first_seen_at)) = row else {
            return Ok(None);
        };

        let disposition =
            Disposition::parse(&disposition).ok_or_else(|| StorageError::CorruptRecord {
                id: id.clone(),
                details: format!("unknown disposition '{}'", disposition),
            })?;
        let first_seen_at = DateTime::<Utc>::from_timestamp_millis(first_seen_at).ok_or_else(|| {
            StorageError::CorruptRecord {
                id: id.clone(),
                details: format!("timestamp {} out of range", first_seen_at),
            }
        })?;

        Ok(Some(SeenRecord {
            id,
            disposition,
            first_seen_at,
        }))
    }

    async fn count(&self) -> Result<u64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seen_items")
            .fetch_one(self.pool()?)
            .await
            .map_err(storage_error)?;
        Ok(count as u64)
    }
}
