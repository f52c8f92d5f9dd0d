//! Protocol message types for hub communication.

use chat_core::{ChatId, UserId};
use serde::{Deserialize, Serialize};

/// Message sent by a client to post into a chat.
///
/// ```json
/// {"chat_id": 7, "content": "hi"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Target chat
    pub chat_id: ChatId,
    /// Message text
    pub content: String,
}

impl InboundMessage {
    pub fn new(chat_id: ChatId, content: impl Into<String>) -> Self {
        Self {
            chat_id,
            content: content.into(),
        }
    }

    /// Attaches the sender identity, producing the frame delivered to members.
    pub fn from_sender(self, sender_id: UserId) -> OutboundMessage {
        OutboundMessage {
            chat_id: self.chat_id,
            content: self.content,
            sender_id,
        }
    }
}

/// Message delivered by the hub to every member of a chat.
///
/// ```json
/// {"chat_id": 7, "content": "hi", "sender_id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Chat the message was posted to
    pub chat_id: ChatId,
    /// Message text
    pub content: String,
    /// Author of the message
    pub sender_id: UserId,
}
