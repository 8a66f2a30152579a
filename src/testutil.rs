//! Stores for exercising the live core without a database.

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::store::{ChatMessage, ChatThread, MessageStore, NewMessage, StoreError};

/// Every operation fails.
pub struct FailingStore;

#[async_trait]
impl MessageStore for FailingStore {
    async fn create_thread(&self, _stream_id: &str) -> Result<ChatThread, StoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn close_thread(&self, _stream_id: &str) -> Result<bool, StoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn is_thread_active(&self, _stream_id: &str) -> Result<bool, StoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn save_message(&self, _message: NewMessage) -> Result<ChatMessage, StoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }

    async fn fetch_recent_messages(
        &self,
        _stream_id: &str,
        _limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        Err(sqlx::Error::PoolClosed.into())
    }
}

/// Reports each save attempt on a channel; saves fail when `fail_saves` is set.
pub struct RecordingStore {
    saves: mpsc::UnboundedSender<NewMessage>,
    fail_saves: bool,
}

impl RecordingStore {
    pub fn new(fail_saves: bool) -> (RecordingStore, mpsc::UnboundedReceiver<NewMessage>) {
        let (saves, saved) = mpsc::unbounded_channel();
        (RecordingStore { saves, fail_saves }, saved)
    }
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn create_thread(&self, stream_id: &str) -> Result<ChatThread, StoreError> {
        Ok(ChatThread {
            id: stream_id.to_owned(),
            stream_id: stream_id.to_owned(),
            created_at: OffsetDateTime::now_utc(),
            active: true,
        })
    }

    async fn close_thread(&self, _stream_id: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn is_thread_active(&self, _stream_id: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn save_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let _ = self.saves.send(message.clone());
        if self.fail_saves {
            return Err(sqlx::Error::PoolTimedOut.into());
        }

        let NewMessage { stream_id, user_id, username, content, created_at } = message;
        Ok(ChatMessage { id: 1, stream_id, user_id, username, content, created_at })
    }

    async fn fetch_recent_messages(
        &self,
        _stream_id: &str,
        _limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(Vec::new())
    }
}
