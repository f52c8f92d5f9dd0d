//! Domain-specific error types following panic-free policy.

use crate::{ChatId, UserId};
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The chat does not exist
    #[error("Chat not found: {chat_id}")]
    ChatNotFound { chat_id: ChatId },

    /// A chat with this ID was already created
    #[error("Chat already exists: {chat_id}")]
    ChatAlreadyExists { chat_id: ChatId },

    /// The user is not a member of the chat
    #[error("User {user_id} is not a member of chat {chat_id}")]
    NotAMember { user_id: UserId, chat_id: ChatId },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
