#[cfg(test)]
mod tests {
    use crate::Database;
    use chrono::{DateTime, Utc};
    use listener_core::{CoreError, Disposition, SeenStore, StorageError};
    use std::env;
    use std::path::PathBuf;

    fn test_db_path() -> PathBuf {
        env::temp_dir().join(format!("test_reddit_listener_{}.db", uuid::Uuid::new_v4()))
    }

    async fn open_db(path: &PathBuf) -> Database {
        let db_url = format!("sqlite://{}", path.display());

        let mut db = Database::new(db_url);
        db.connect()
            .await
            .expect("Failed to connect to test database");
        db.run_migrations().await.expect("Failed to run migrations");

        db
    }

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[tokio::test]
    async fn test_database_connection_and_migrations() {
        let path = test_db_path();
        let db = open_db(&path).await;

        assert_eq!(db.count().await.unwrap(), 0);
        // Migrations are safe to re-run on every startup.
        db.run_migrations().await.unwrap();

        db.close().await;
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_mark_and_query() {
        let path = test_db_path();
        let db = open_db(&path).await;

        assert!(!db.has_seen("t1_abc").await.unwrap());
        db.mark_seen("t1_abc", at(1_700_000_000_123), Disposition::Ignored)
            .await
            .unwrap();
        assert!(db.has_seen("t1_abc").await.unwrap());
        assert!(!db.has_seen("t1_other").await.unwrap());

        let record = db.get("t1_abc").await.unwrap().unwrap();
        assert_eq!(record.id, "t1_abc");
        assert_eq!(record.disposition, Disposition::Ignored);
        assert_eq!(record.first_seen_at, at(1_700_000_000_123));
        assert!(!record.notified());
        assert!(db.get("t1_other").await.unwrap().is_none());

        db.close().await;
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_mark_seen_keeps_first_record() {
        let path = test_db_path();
        let db = open_db(&path).await;

        db.mark_seen("t3_x", at(1_000), Disposition::Notified)
            .await
            .unwrap();
        db.mark_seen("t3_x", at(2_000), Disposition::Ignored)
            .await
            .unwrap();

        let record = db.get("t3_x").await.unwrap().unwrap();
        assert_eq!(record.disposition, Disposition::Notified);
        assert_eq!(record.first_seen_at, at(1_000));
        assert_eq!(db.count().await.unwrap(), 1);

        db.close().await;
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_seen_items_survive_restart() {
        let path = test_db_path();

        let db = open_db(&path).await;
        db.mark_seen("t3_persist", Utc::now(), Disposition::Notified)
            .await
            .unwrap();
        db.close().await;

        let reopened = open_db(&path).await;
        assert!(reopened.has_seen("t3_persist").await.unwrap());
        assert!(reopened.get("t3_persist").await.unwrap().unwrap().notified());

        reopened.close().await;
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let mut db = Database::new("sqlite::memory:".to_string());
        db.connect().await.unwrap();
        db.run_migrations().await.unwrap();

        db.mark_seen("t1_mem", Utc::now(), Disposition::Ignored)
            .await
            .unwrap();
        assert!(db.has_seen("t1_mem").await.unwrap());
    }

    #[tokio::test]
    async fn test_queries_fail_before_connect() {
        let db = Database::new("sqlite::memory:".to_string());

        let result = db.has_seen("t1_abc").await;
        assert!(matches!(
            result,
            Err(CoreError::Storage(StorageError::ConnectionFailed { .. }))
        ));
    }
}
