//! Durable threads and messages.
//!
//! The live core only ever talks to [`MessageStore`]; the SQLite
//! implementation lives in [`sqlite`].

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored timestamp out of range: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

/// The chat thread attached to one stream. Only active threads accept live connections.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatThread {
    pub id: String,
    pub stream_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub id: i64,
    pub stream_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A message that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub stream_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_thread(&self, stream_id: &str) -> Result<ChatThread, StoreError>;

    /// Deactivates every active thread of the stream. Returns whether one was active.
    async fn close_thread(&self, stream_id: &str) -> Result<bool, StoreError>;

    async fn is_thread_active(&self, stream_id: &str) -> Result<bool, StoreError>;

    async fn save_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    /// Newest first.
    async fn fetch_recent_messages(
        &self,
        stream_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}
