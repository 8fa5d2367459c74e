//! SQLite database for subscriptions and the media file-id cache.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use cadence_scheduler::{StoreError, SubscriberId, Subscription, SubscriptionStore};

use crate::DbError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS subscription (
        chat_id INTEGER PRIMARY KEY,
        created_at INTEGER NOT NULL,
        period INTEGER NOT NULL CHECK (period > 0)
    );

    CREATE TABLE IF NOT EXISTS images (
        name TEXT PRIMARY KEY,
        tg_id TEXT NOT NULL
    );
";

/// SQLite-backed subscription store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the SQLite database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "database initialized");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Insert or replace the subscription for its chat.
    pub fn upsert_subscription(&self, sub: &Subscription) -> Result<(), DbError> {
        let period = i64::try_from(sub.period.as_secs())
            .map_err(|_| DbError::InvalidRecord(format!("period too large: {:?}", sub.period)))?;

        self.conn()?.execute(
            "INSERT INTO subscription (chat_id, created_at, period)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(chat_id) DO UPDATE SET created_at = excluded.created_at, period = excluded.period",
            params![sub.subscriber_id, sub.created_at.timestamp(), period],
        )?;
        Ok(())
    }

    /// Delete the subscription for a chat. Missing rows are not an error.
    pub fn delete_subscription(&self, chat_id: SubscriberId) -> Result<(), DbError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM subscription WHERE chat_id = ?1", params![chat_id])?;
        debug!(chat_id, removed, "deleted subscription row");
        Ok(())
    }

    /// List every stored subscription.
    pub fn list_subscriptions(&self) -> Result<Vec<Subscription>, DbError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT chat_id, created_at, period FROM subscription ORDER BY chat_id")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(chat_id, created_at, period)| {
                let created_at = DateTime::from_timestamp(created_at, 0).ok_or_else(|| {
                    DbError::InvalidRecord(format!("chat {chat_id}: bad created_at {created_at}"))
                })?;
                let period = u64::try_from(period)
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| {
                        DbError::InvalidRecord(format!("chat {chat_id}: bad period {period}"))
                    })?;
                Ok(Subscription::new(
                    chat_id,
                    created_at,
                    Duration::from_secs(period),
                ))
            })
            .collect()
    }

    // =========================================================================
    // Media cache
    // =========================================================================

    /// All cached file ids, keyed by image name.
    pub fn file_ids(&self) -> Result<HashMap<String, String>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, tg_id FROM images")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(rows)
    }

    /// Remember the Telegram file id for an uploaded image.
    pub fn save_file_id(&self, name: &str, tg_id: &str) -> Result<(), DbError> {
        self.conn()?.execute(
            "INSERT INTO images (name, tg_id) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET tg_id = excluded.tg_id",
            params![name, tg_id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn get_all(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.list_subscriptions()?)
    }

    async fn create(&self, subscription: &Subscription) -> Result<(), StoreError> {
        Ok(self.upsert_subscription(subscription)?)
    }

    async fn delete(&self, subscriber_id: SubscriberId) -> Result<(), StoreError> {
        Ok(self.delete_subscription(subscriber_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sub(chat_id: i64, period_secs: u64) -> Subscription {
        Subscription::new(
            chat_id,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            Duration::from_secs(period_secs),
        )
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let db = SqliteStore::open_in_memory().unwrap();

        db.upsert_subscription(&sub(1, 900)).unwrap();
        db.upsert_subscription(&sub(1, 3600)).unwrap();

        let all = db.list_subscriptions().unwrap();
        assert_eq!(all, vec![sub(1, 3600)]);
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let db = SqliteStore::open_in_memory().unwrap();
        assert!(db.delete_subscription(404).is_ok());
    }

    #[test]
    fn test_list_is_ordered_by_chat() {
        let db = SqliteStore::open_in_memory().unwrap();
        for id in [30, -10, 20] {
            db.upsert_subscription(&sub(id, 900)).unwrap();
        }

        let ids: Vec<_> = db
            .list_subscriptions()
            .unwrap()
            .into_iter()
            .map(|s| s.subscriber_id)
            .collect();
        assert_eq!(ids, vec![-10, 20, 30]);
    }

    #[test]
    fn test_file_id_cache() {
        let db = SqliteStore::open_in_memory().unwrap();

        db.save_file_id("frog.png", "AgAD1").unwrap();
        db.save_file_id("dance.gif", "CgAD2").unwrap();
        db.save_file_id("frog.png", "AgAD3").unwrap();

        let ids = db.file_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids["frog.png"], "AgAD3");
        assert_eq!(ids["dance.gif"], "CgAD2");
    }

    #[test]
    fn test_corrupt_period_is_reported() {
        let db = SqliteStore::open_in_memory().unwrap();
        db.conn()
            .unwrap()
            .execute_batch(
                "DROP TABLE subscription;
                 CREATE TABLE subscription (chat_id INTEGER PRIMARY KEY, created_at INTEGER, period INTEGER);
                 INSERT INTO subscription VALUES (1, 0, -5);",
            )
            .unwrap();

        assert!(matches!(
            db.list_subscriptions(),
            Err(DbError::InvalidRecord(_))
        ));
    }
}
