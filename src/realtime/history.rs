use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::frame::OutboundFrame;
use crate::store::MessageStore;

/// Pushes the room's most recent messages, oldest first, into a newly
/// admitted connection's mailbox and returns how many were queued.
///
/// Runs alongside registration, so live messages may land before, between
/// or after the replayed ones. Stops at the first full mailbox and never
/// retries a failed fetch.
pub async fn replay(
    store: Arc<dyn MessageStore>,
    mailbox: mpsc::Sender<Utf8Bytes>,
    room_id: String,
    limit: u32,
) -> usize {
    if limit == 0 {
        return 0;
    }

    let messages = match store.fetch_recent_messages(&room_id, limit).await {
        Ok(messages) => messages,
        Err(err) => {
            warn!(room = %room_id, error = %err, "history load failed");
            return 0;
        }
    };

    let mut queued = 0;
    for message in messages.iter().rev() {
        let payload = match OutboundFrame::history(message).encode() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(room = %room_id, message_id = message.id, error = %err, "skipping unencodable history item");
                continue;
            }
        };

        match mailbox.try_send(payload) {
            Ok(()) => queued += 1,
            Err(TrySendError::Full(_)) => {
                debug!(room = %room_id, queued, "mailbox full, history cut short");
                break;
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    queued
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::store::{NewMessage, SqliteStore};
    use crate::testutil::FailingStore;

    async fn store_with(room_id: &str, count: i64) -> Arc<dyn MessageStore> {
        let store = SqliteStore::in_memory().await.unwrap();
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        for i in 1..=count {
            store
                .save_message(NewMessage {
                    stream_id: room_id.to_owned(),
                    user_id: format!("u{i}"),
                    username: "Lucky Owl".to_owned(),
                    content: format!("m{i}"),
                    created_at: start + Duration::seconds(i),
                })
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    fn frame(payload: Utf8Bytes) -> OutboundFrame {
        serde_json::from_str(payload.as_str()).unwrap()
    }

    #[tokio::test]
    async fn replays_oldest_to_newest_as_history() {
        let store = store_with("r1", 50).await;
        let (mailbox, mut outbox) = mpsc::channel(256);

        let queued = replay(store, mailbox, "r1".to_owned(), 50).await;
        assert_eq!(queued, 50);

        for i in 1..=50 {
            match frame(outbox.recv().await.unwrap()) {
                OutboundFrame::History { content, user_id, .. } => {
                    assert_eq!(content, format!("m{i}"));
                    assert_eq!(user_id, format!("u{i}"));
                }
                other => panic!("expected history, got {other:?}"),
            }
        }
        assert!(outbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn only_the_latest_items_within_the_limit() {
        let store = store_with("r1", 10).await;
        let (mailbox, mut outbox) = mpsc::channel(16);

        assert_eq!(replay(store, mailbox, "r1".to_owned(), 3).await, 3);

        let contents: Vec<_> = std::iter::from_fn(|| outbox.try_recv().ok())
            .map(|payload| match frame(payload) {
                OutboundFrame::History { content, .. } => content,
                other => panic!("expected history, got {other:?}"),
            })
            .collect();
        assert_eq!(contents, ["m8", "m9", "m10"]);
    }

    #[tokio::test]
    async fn empty_room_replays_nothing() {
        let store = store_with("r1", 0).await;
        let (mailbox, mut outbox) = mpsc::channel(4);

        assert_eq!(replay(store, mailbox, "r1".to_owned(), 50).await, 0);
        assert!(outbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn stops_when_the_mailbox_fills() {
        let store = store_with("r1", 5).await;
        let (mailbox, _outbox) = mpsc::channel(2);

        assert_eq!(replay(store, mailbox, "r1".to_owned(), 5).await, 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_not_fatal() {
        let (mailbox, mut outbox) = mpsc::channel(4);

        assert_eq!(replay(Arc::new(FailingStore), mailbox, "r1".to_owned(), 50).await, 0);
        assert!(outbox.recv().await.is_none());
    }
}
