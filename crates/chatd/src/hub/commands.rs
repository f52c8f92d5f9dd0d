//! Hub actor commands, errors, and outcomes.
//!
//! This module defines the message types for communicating with the `HubActor`:
//! - `HubCommand`: Commands sent to the actor
//! - `HubError`: Errors surfaced to callers of the handle
//! - `BroadcastError` / `BroadcastOutcome`: Result of a single fan-out
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::fmt;

use chat_core::{ChatId, StoreError, UserId};
use chat_protocol::InboundMessage;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::connection::{Connection, ConnectionId};

// ============================================================================
// Hub Commands
// ============================================================================

/// Commands sent to the hub actor.
///
/// Request-style commands carry a oneshot channel for the response.
/// `Unregister` and connection-originated `Broadcast`s are fire-and-forget.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a connection to the registry and start its loops.
    ///
    /// The connection is boxed to reduce enum size variance.
    Register {
        /// Connection to take ownership of (boxed for size optimization)
        connection: Box<Connection>,
        /// Channel to send the assigned id
        respond_to: oneshot::Sender<ConnectionId>,
    },

    /// Remove a connection from the registry.
    ///
    /// Idempotent: unknown ids are ignored.
    Unregister {
        /// Connection to remove
        connection_id: ConnectionId,
        /// Why the connection is going away
        reason: RemovalReason,
    },

    /// Persist a message and fan it out to every member of its chat.
    Broadcast {
        /// Connection the message arrived on
        connection_id: ConnectionId,
        /// Authenticated author
        sender_id: UserId,
        /// Decoded inbound frame
        message: InboundMessage,
        /// Optional channel for the fan-out result
        respond_to: Option<oneshot::Sender<Result<BroadcastOutcome, BroadcastError>>>,
    },

    /// Snapshot every registered connection.
    ListConnections {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<ConnectionInfo>>,
    },

    /// Reload chat membership for every live connection of a user.
    ///
    /// # Errors
    /// - `HubError::Store` if the membership lookup fails
    RefreshMembership {
        /// User whose membership changed
        user_id: UserId,
        /// Channel to send the number of connections updated
        respond_to: oneshot::Sender<Result<usize, HubError>>,
    },
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by `HubHandle` operations.
#[derive(Debug, Clone, Error)]
pub enum HubError {
    /// The actor has shut down or dropped the response channel.
    #[error("hub channel closed")]
    ChannelClosed,

    /// The chat store failed while serving the request.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Reasons a broadcast was abandoned before fan-out.
#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    #[error("chat not found: {0}")]
    ChatNotFound(ChatId),

    #[error("user {sender_id} is not a member of chat {chat_id}")]
    SenderNotMember { sender_id: UserId, chat_id: ChatId },

    /// Existence check or persistence failed; nothing was delivered.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a successful fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Connections whose mailbox accepted the message
    pub delivered: usize,
    /// Connections removed because their mailbox was full or closed
    pub evicted: Vec<ConnectionId>,
}

// ============================================================================
// Connection Snapshots
// ============================================================================

/// Read-only view of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: UserId,
    /// Chat memberships, sorted ascending
    pub chats: Vec<ChatId>,
}

/// Reason why a connection was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The client closed the connection or the read side failed.
    Disconnected,

    /// A write failed or exceeded its deadline.
    WriteFailed,

    /// The mailbox was full during a broadcast.
    SlowConsumer,

    /// The mailbox receiver was already gone during a broadcast.
    MailboxClosed,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "client disconnected"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::SlowConsumer => write!(f, "mailbox full"),
            Self::MailboxClosed => write!(f, "mailbox closed"),
        }
    }
}
