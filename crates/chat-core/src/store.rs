//! Persistence gateway consumed by the hub.
//!
//! The hub never talks to a database directly. Everything it needs from
//! durable storage goes through [`ChatStore`]:
//! - membership lookup when a connection is established
//! - existence check before a message is accepted
//! - durable recording of a message before it is fanned out
//!
//! Implementations must be safe to call concurrently and provide at least
//! per-call atomicity. No transaction spans the persist-then-deliver sequence.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::{ChatId, UserId};

/// Errors returned by a [`ChatStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or failed internally.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write (constraint violation, unknown chat, ...).
    #[error("store rejected operation: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Creates an unavailable error from any displayable error.
    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Durable store for chat membership and messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Returns every chat the user belongs to.
    ///
    /// Called once per connection to compute its authorization set.
    async fn chat_ids_for_user(&self, user_id: UserId) -> Result<HashSet<ChatId>, StoreError>;

    /// Returns whether the chat exists at all.
    async fn chat_exists(&self, chat_id: ChatId) -> Result<bool, StoreError>;

    /// Durably records a message attributed to `sender_id` in `chat_id`.
    ///
    /// Must only return `Ok` once the message is recoverable by history queries.
    async fn record_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: &str,
    ) -> Result<(), StoreError>;
}
