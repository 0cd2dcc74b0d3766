//! SQLite subscriber registry.

use crate::subscriber::Subscriber;
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Persistent set of subscribed chats plus their CEX-visibility preference.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Subscribe a chat. Returns `false` if it was already subscribed.
    async fn add(&self, chat_id: i64) -> Result<bool, DbError>;

    /// Unsubscribe a chat. Returns `false` if it was not subscribed.
    async fn remove(&self, chat_id: i64) -> Result<bool, DbError>;

    /// All subscribed chat IDs.
    async fn list(&self) -> Result<Vec<i64>, DbError>;

    /// CEX-visibility preference; `true` when never set.
    async fn get_preference(&self, chat_id: i64) -> Result<bool, DbError>;

    async fn set_preference(&self, chat_id: i64, show_cex: bool) -> Result<(), DbError>;

    /// Subscribers with their preferences resolved.
    async fn subscribers(&self) -> Result<Vec<Subscriber>, DbError> {
        let mut subscribers = Vec::new();
        for chat_id in self.list().await? {
            subscribers.push(Subscriber {
                chat_id,
                show_cex: self.get_preference(chat_id).await?,
            });
        }
        Ok(subscribers)
    }
}

/// Database connection for the subscriber registry.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    preferences: Arc<DashMap<i64, bool>>,
}

impl Database {
    /// Connect to SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // Every connection to an in-memory database opens a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            preferences: Arc::new(DashMap::new()),
        };
        db.run_migrations().await?;
        db.load_preferences().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                chat_id INTEGER PRIMARY KEY
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                chat_id INTEGER PRIMARY KEY,
                show_cex BOOLEAN NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_preferences(&self) -> Result<(), DbError> {
        let rows = sqlx::query_as::<_, (i64, bool)>("SELECT chat_id, show_cex FROM user_preferences")
            .fetch_all(&self.pool)
            .await?;

        for (chat_id, show_cex) in rows {
            self.preferences.insert(chat_id, show_cex);
        }
        info!(count = self.preferences.len(), "Loaded user preferences");
        Ok(())
    }

    pub async fn subscriber_count(&self) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscribers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Close the pool. Later queries fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SubscriberStore for Database {
    async fn add(&self, chat_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("INSERT OR IGNORE INTO subscribers (chat_id) VALUES (?)")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, chat_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM subscribers WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<i64>, DbError> {
        let rows = sqlx::query_scalar::<_, i64>("SELECT chat_id FROM subscribers ORDER BY chat_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_preference(&self, chat_id: i64) -> Result<bool, DbError> {
        if let Some(show_cex) = self.preferences.get(&chat_id) {
            return Ok(*show_cex);
        }

        let stored = sqlx::query_scalar::<_, bool>(
            "SELECT show_cex FROM user_preferences WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        let show_cex = stored.unwrap_or(true);
        self.preferences.insert(chat_id, show_cex);
        Ok(show_cex)
    }

    async fn set_preference(&self, chat_id: i64, show_cex: bool) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (chat_id, show_cex)
            VALUES (?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET show_cex = excluded.show_cex
            "#,
        )
        .bind(chat_id)
        .bind(show_cex)
        .execute(&self.pool)
        .await?;

        self.preferences.insert(chat_id, show_cex);
        debug!(chat_id = chat_id, show_cex = show_cex, "Preference updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_closed_database_errors() {
        let db = memory_db().await;
        db.close().await;
        assert!(matches!(db.add(1).await, Err(DbError::Sqlx(sqlx::Error::PoolClosed))));
        assert!(db.list().await.is_err());
    }

    #[tokio::test]
    async fn test_database_connect() {
        let db = memory_db().await;
        assert!(db.list().await.unwrap().is_empty());
        assert_eq!(db.subscriber_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_and_remove_subscriber() {
        let db = memory_db().await;

        assert!(db.add(123456).await.unwrap());
        assert!(!db.add(123456).await.unwrap());
        assert!(db.add(-100200).await.unwrap());
        assert_eq!(db.list().await.unwrap(), vec![-100200, 123456]);

        assert!(db.remove(123456).await.unwrap());
        assert!(!db.remove(123456).await.unwrap());
        assert_eq!(db.list().await.unwrap(), vec![-100200]);
    }

    #[tokio::test]
    async fn test_preference_defaults_to_true() {
        let db = memory_db().await;
        assert!(db.get_preference(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_preference_overwrites() {
        let db = memory_db().await;

        db.set_preference(42, false).await.unwrap();
        assert!(!db.get_preference(42).await.unwrap());

        db.set_preference(42, true).await.unwrap();
        assert!(db.get_preference(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_preference_survives_cache_reload() {
        let db = memory_db().await;
        db.set_preference(7, false).await.unwrap();

        db.preferences.clear();
        assert!(!db.get_preference(7).await.unwrap());

        db.preferences.clear();
        db.load_preferences().await.unwrap();
        assert_eq!(db.preferences.get(&7).map(|v| *v), Some(false));
    }

    #[tokio::test]
    async fn test_subscribers_resolve_preferences() {
        let db = memory_db().await;
        db.add(1).await.unwrap();
        db.add(2).await.unwrap();
        db.set_preference(2, false).await.unwrap();

        let subscribers = db.subscribers().await.unwrap();
        assert_eq!(
            subscribers,
            vec![
                Subscriber { chat_id: 1, show_cex: true },
                Subscriber { chat_id: 2, show_cex: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_preference_kept_after_unsubscribe() {
        let db = memory_db().await;
        db.add(9).await.unwrap();
        db.set_preference(9, false).await.unwrap();
        db.remove(9).await.unwrap();
        db.add(9).await.unwrap();

        assert!(!db.get_preference(9).await.unwrap());
    }
}
