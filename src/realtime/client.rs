//! One live socket, driven by an inbound and an outbound pump that share
//! nothing but the socket itself.

use std::fmt::Display;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::ws::{Message, Utf8Bytes, WebSocket},
};
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use time::OffsetDateTime;
use tokio::{
    sync::mpsc,
    time::{interval_at, timeout, Instant},
};
use tracing::{debug, info, warn};

use super::{
    frame::{self, OutboundFrame},
    room::RoomHandle,
    ClientId,
};
use crate::config::RealtimeConfig;
use crate::store::{MessageStore, NewMessage};

pub struct Client {
    pub(crate) id: ClientId,
    pub(crate) room: RoomHandle,
    pub(crate) user_id: String,
    pub(crate) display_name: String,
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) limits: RealtimeConfig,
}

impl Client {
    /// Drives the connection until either pump gives up, then leaves the room.
    pub async fn run(self, socket: WebSocket, outbox: mpsc::Receiver<Utf8Bytes>) {
        let (sink, stream) = socket.split();
        let mut write_pump = tokio::spawn(write_pump(sink, outbox, self.limits));

        tokio::select! {
            _ = self.read_pump(stream) => write_pump.abort(),
            _ = &mut write_pump => {},
        }

        self.room.unregister(self.id).await;
        info!(room = %self.room.room_id(), client = %self.id, user = %self.user_id, "client left");
    }

    /// Reads frames until the peer goes away, a read fails or the read
    /// deadline passes without any frame (pongs included).
    pub(crate) async fn read_pump<S, E>(&self, mut stream: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        loop {
            let message = match timeout(self.limits.read_deadline, stream.next()).await {
                Err(_) => {
                    debug!(client = %self.id, "read deadline passed");
                    return;
                }
                Ok(None) => return,
                Ok(Some(Err(err))) => {
                    debug!(client = %self.id, error = %err, "read failed");
                    return;
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    if self.accept(text.as_str()).await.is_err() {
                        return;
                    }
                }
                Message::Close(_) => return,
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }

    /// Persists and broadcasts one inbound frame. The two are independent:
    /// a failed save is logged and the message still goes out live.
    async fn accept(&self, text: &str) -> Result<(), super::room::RoomClosed> {
        let Some(content) = frame::parse_content(text, self.limits.max_content_bytes) else {
            return Ok(());
        };
        let created_at = OffsetDateTime::now_utc();

        let store = Arc::clone(&self.store);
        let message = NewMessage {
            stream_id: self.room.room_id().to_owned(),
            user_id: self.user_id.clone(),
            username: self.display_name.clone(),
            content: content.clone(),
            created_at,
        };
        tokio::spawn(async move {
            if let Err(err) = store.save_message(message).await {
                warn!(error = %err, "message save failed");
            }
        });

        let live = OutboundFrame::Message {
            user_id: self.user_id.clone(),
            role: self.display_name.clone(),
            content,
            timestamp: created_at.unix_timestamp(),
        };
        match live.encode() {
            Ok(payload) => self.room.broadcast(payload).await,
            Err(err) => {
                warn!(client = %self.id, error = %err, "failed to encode message");
                Ok(())
            }
        }
    }
}

/// Drains the mailbox to the socket and keeps the peer alive with pings.
/// A closed mailbox means the room let go of us: say goodbye and stop.
pub(crate) async fn write_pump<W>(mut sink: W, mut outbox: mpsc::Receiver<Utf8Bytes>, limits: RealtimeConfig)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    // a period past the clock's range disables pings
    let mut ping = Instant::now()
        .checked_add(limits.ping_period)
        .map(|first| interval_at(first, limits.ping_period));

    loop {
        let next_ping = async {
            match ping.as_mut() {
                Some(ping) => {
                    ping.tick().await;
                }
                None => future::pending::<()>().await,
            }
        };

        let message = tokio::select! {
            biased;
            payload = outbox.recv() => match payload {
                Some(payload) => Message::Text(payload),
                None => {
                    let _ = timeout(limits.write_deadline, sink.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = next_ping => Message::Ping(Bytes::new()),
        };

        match timeout(limits.write_deadline, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(error = %err, "write failed");
                return;
            }
            Err(_) => {
                debug!("write deadline passed");
                return;
            }
        }
    }
}
