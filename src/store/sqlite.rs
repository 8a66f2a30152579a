use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::{ChatMessage, ChatThread, MessageStore, NewMessage, StoreError};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS chat_threads (
        id TEXT PRIMARY KEY,
        stream_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        active INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_chat_threads_stream ON chat_threads (stream_id, active)",
    "CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        stream_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        username TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_thread_created ON messages (stream_id, created_at DESC)",
];

#[derive(Clone)]
pub struct SqliteStore {
    db_pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<SqliteStore, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        info!(database_url, "connected to message store");
        Self::with_pool(db_pool).await
    }

    /// A private database that lives as long as the store. Every pooled
    /// connection to `:memory:` is its own database, so the pool holds one.
    pub async fn in_memory() -> Result<SqliteStore, StoreError> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(db_pool).await
    }

    async fn with_pool(db_pool: SqlitePool) -> Result<SqliteStore, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&db_pool).await?;
        }
        Ok(SqliteStore { db_pool })
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_thread(&self, stream_id: &str) -> Result<ChatThread, StoreError> {
        let thread = ChatThread {
            id: Uuid::now_v7().to_string(),
            stream_id: stream_id.to_owned(),
            created_at: now_seconds(),
            active: true,
        };

        sqlx::query("INSERT INTO chat_threads (id,stream_id,created_at,active) VALUES (?,?,?,?)")
            .bind(&thread.id)
            .bind(&thread.stream_id)
            .bind(thread.created_at.unix_timestamp())
            .bind(thread.active)
            .execute(&self.db_pool)
            .await?;

        Ok(thread)
    }

    async fn close_thread(&self, stream_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE chat_threads SET active=0 WHERE stream_id=? AND active=1")
            .bind(stream_id)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_thread_active(&self, stream_id: &str) -> Result<bool, StoreError> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM chat_threads WHERE stream_id=? AND active=1 LIMIT 1")
                .bind(stream_id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(found.is_some())
    }

    async fn save_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let id = sqlx::query(
            "INSERT INTO messages (stream_id,user_id,username,content,created_at) VALUES (?,?,?,?,?)",
        )
        .bind(&message.stream_id)
        .bind(&message.user_id)
        .bind(&message.username)
        .bind(&message.content)
        .bind(message.created_at.unix_timestamp())
        .execute(&self.db_pool)
        .await?
        .last_insert_rowid();

        let NewMessage { stream_id, user_id, username, content, created_at } = message;
        Ok(ChatMessage { id, stream_id, user_id, username, content, created_at })
    }

    async fn fetch_recent_messages(
        &self,
        stream_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows: Vec<(i64, String, String, String, String, i64)> = sqlx::query_as(
            "SELECT id,stream_id,user_id,username,content,created_at FROM messages
             WHERE stream_id=? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(stream_id)
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|(id, stream_id, user_id, username, content, created_at)| -> Result<ChatMessage, StoreError> {
                Ok(ChatMessage {
                    id,
                    stream_id,
                    user_id,
                    username,
                    content,
                    created_at: OffsetDateTime::from_unix_timestamp(created_at)?,
                })
            })
            .collect()
    }
}

/// Whole seconds, which is what the table keeps.
fn now_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn message(stream_id: &str, content: &str, created_at: OffsetDateTime) -> NewMessage {
        NewMessage {
            stream_id: stream_id.to_owned(),
            user_id: "u1".to_owned(),
            username: "Quiet Owl".to_owned(),
            content: content.to_owned(),
            created_at,
        }
    }

    #[tokio::test]
    async fn threads_open_and_close() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(!store.is_thread_active("s1").await.unwrap());

        let thread = store.create_thread("s1").await.unwrap();
        assert!(thread.active);
        assert_eq!(thread.stream_id, "s1");
        assert!(store.is_thread_active("s1").await.unwrap());
        assert!(!store.is_thread_active("s2").await.unwrap());

        assert!(store.close_thread("s1").await.unwrap());
        assert!(!store.is_thread_active("s1").await.unwrap());
        assert!(!store.close_thread("s1").await.unwrap());
    }

    #[tokio::test]
    async fn recent_messages_are_newest_first_and_scoped() {
        let store = SqliteStore::in_memory().await.unwrap();
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

        for i in 0..5 {
            store
                .save_message(message("s1", &format!("m{i}"), start + Duration::seconds(i)))
                .await
                .unwrap();
        }
        store.save_message(message("s2", "elsewhere", start)).await.unwrap();

        let recent = store.fetch_recent_messages("s1", 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m4", "m3", "m2"]);
        assert_eq!(recent[0].created_at, start + Duration::seconds(4));
        assert!(recent.iter().all(|m| m.stream_id == "s1"));
    }

    #[tokio::test]
    async fn same_second_messages_keep_insertion_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

        let first = store.save_message(message("s1", "first", at)).await.unwrap();
        let second = store.save_message(message("s1", "second", at)).await.unwrap();
        assert!(second.id > first.id);

        let recent = store.fetch_recent_messages("s1", 10).await.unwrap();
        assert_eq!(recent[0].content, "second");
        assert_eq!(recent[1].content, "first");
    }
}
