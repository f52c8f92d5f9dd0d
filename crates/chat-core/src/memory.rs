//! In-process [`ChatStore`] implementation.
//!
//! Keeps chats, membership and an append-only message log behind a single
//! `RwLock`. Used by the daemon when no external database is configured and
//! by the test suites.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{ChatStore, StoreError};
use crate::{ChatId, DomainError, DomainResult, UserId};

/// Initial chat definition, typically read from the `[[chats]]` config table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSeed {
    pub id: ChatId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<UserId>,
}

/// A message as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ChatRecord {
    name: String,
    members: HashSet<UserId>,
}

#[derive(Debug, Default)]
struct Inner {
    chats: HashMap<ChatId, ChatRecord>,
    messages: Vec<StoredMessage>,
    next_message_id: u64,
}

/// Memory-backed chat store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given chats.
    ///
    /// A seed repeating an earlier chat ID merges its members into the
    /// existing chat and keeps the first non-empty name.
    pub fn from_seeds(seeds: &[ChatSeed]) -> Self {
        let mut inner = Inner::default();
        for seed in seeds {
            let record = inner.chats.entry(seed.id).or_default();
            if record.name.is_empty() {
                record.name = seed.name.clone();
            }
            record.members.extend(seed.members.iter().copied());
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Creates a new chat with the given members.
    pub async fn create_chat(
        &self,
        chat_id: ChatId,
        name: impl Into<String>,
        members: impl IntoIterator<Item = UserId>,
    ) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if inner.chats.contains_key(&chat_id) {
            return Err(DomainError::ChatAlreadyExists { chat_id });
        }
        inner.chats.insert(
            chat_id,
            ChatRecord {
                name: name.into(),
                members: members.into_iter().collect(),
            },
        );
        debug!(chat_id = %chat_id, "Chat created");
        Ok(())
    }

    /// Adds a user to a chat. Adding an existing member is a no-op.
    pub async fn add_member(&self, chat_id: ChatId, user_id: UserId) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let chat = inner
            .chats
            .get_mut(&chat_id)
            .ok_or(DomainError::ChatNotFound { chat_id })?;
        chat.members.insert(user_id);
        Ok(())
    }

    /// Removes a user from a chat.
    pub async fn remove_member(&self, chat_id: ChatId, user_id: UserId) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let chat = inner
            .chats
            .get_mut(&chat_id)
            .ok_or(DomainError::ChatNotFound { chat_id })?;
        if !chat.members.remove(&user_id) {
            return Err(DomainError::NotAMember { user_id, chat_id });
        }
        Ok(())
    }

    /// Returns every recorded message of a chat in insertion order.
    pub async fn history(&self, chat_id: ChatId) -> Vec<StoredMessage> {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    /// Returns the total number of recorded messages.
    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn chat_ids_for_user(&self, user_id: UserId) -> Result<HashSet<ChatId>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .chats
            .iter()
            .filter(|(_, chat)| chat.members.contains(&user_id))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn chat_exists(&self, chat_id: ChatId) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.chats.contains_key(&chat_id))
    }

    async fn record_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.chats.contains_key(&chat_id) {
            return Err(StoreError::Rejected(format!("unknown chat {chat_id}")));
        }

        inner.next_message_id += 1;
        let id = inner.next_message_id;
        inner.messages.push(StoredMessage {
            id,
            chat_id,
            sender_id,
            content: content.to_string(),
            created_at: Utc::now(),
        });

        debug!(
            message_id = id,
            chat_id = %chat_id,
            sender_id = %sender_id,
            "Message recorded"
        );
        Ok(())
    }
}
