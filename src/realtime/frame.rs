//! What travels over the socket.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};

use crate::store::ChatMessage;

/// One client text frame.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Live message. `role` carries the author's display name.
    Message {
        user_id: String,
        role: String,
        content: String,
        timestamp: i64,
    },
    History {
        user_id: String,
        content: String,
        timestamp: i64,
    },
}

impl OutboundFrame {
    pub fn history(message: &ChatMessage) -> OutboundFrame {
        OutboundFrame::History {
            user_id: message.user_id.clone(),
            content: message.content.clone(),
            timestamp: message.created_at.unix_timestamp(),
        }
    }

    pub fn encode(&self) -> serde_json::Result<Utf8Bytes> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}

/// Parses a text frame into trimmed content, truncated to at most
/// `max_bytes`. Malformed frames and blank content yield `None`.
pub fn parse_content(text: &str, max_bytes: usize) -> Option<String> {
    let InboundFrame { content } = serde_json::from_str(text).ok()?;
    normalize_content(&content, max_bytes)
}

pub fn normalize_content(raw: &str, max_bytes: usize) -> Option<String> {
    let content = raw.trim();
    if content.is_empty() {
        return None;
    }
    if content.len() <= max_bytes {
        return Some(content.to_owned());
    }

    let mut end = max_bytes;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    Some(content[..end].to_owned())
}
