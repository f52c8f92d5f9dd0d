//! Client interface for interacting with the HubActor.
//!
//! The `HubHandle` provides a cheap-to-clone interface for sending commands
//! to the hub actor. The upgrade handler uses it to register connections,
//! and every connection loop holds one to report inbound messages and its
//! own termination.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `HubError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use chat_core::UserId;
use chat_protocol::InboundMessage;

use super::commands::{
    BroadcastError, BroadcastOutcome, ConnectionInfo, HubCommand, HubError, RemovalReason,
};
use crate::connection::{Connection, ConnectionId};

// ============================================================================
// Hub Handle
// ============================================================================

/// Handle for interacting with the hub actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
#[derive(Clone, Debug)]
pub struct HubHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub fn new(sender: mpsc::Sender<HubCommand>) -> Self {
        Self { sender }
    }

    /// Hands a connection to the hub and waits until it is registered.
    ///
    /// Once this returns, broadcasts to any of the connection's chats are
    /// routed to it.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn register(&self, connection: Connection) -> Result<ConnectionId, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::Register {
                connection: Box::new(connection),
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)
    }

    /// Removes a connection from the hub.
    ///
    /// Fire-and-forget; removing an unknown connection is a no-op.
    pub async fn unregister(&self, connection_id: ConnectionId, reason: RemovalReason) {
        // Ignore send errors: actor may be shutting down
        let _ = self
            .sender
            .send(HubCommand::Unregister {
                connection_id,
                reason,
            })
            .await;
    }

    /// Queues an inbound message for fan-out without waiting for the result.
    ///
    /// # Errors
    ///
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn broadcast(
        &self,
        connection_id: ConnectionId,
        sender_id: UserId,
        message: InboundMessage,
    ) -> Result<(), HubError> {
        self.sender
            .send(HubCommand::Broadcast {
                connection_id,
                sender_id,
                message,
                respond_to: None,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Broadcasts a message and waits for the fan-out result.
    ///
    /// The outer error reports a dead actor; the inner one reports why the
    /// message was not delivered.
    pub async fn publish(
        &self,
        connection_id: ConnectionId,
        sender_id: UserId,
        message: InboundMessage,
    ) -> Result<Result<BroadcastOutcome, BroadcastError>, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::Broadcast {
                connection_id,
                sender_id,
                message,
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)
    }

    /// Lists all registered connections.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn list_connections(&self) -> Vec<ConnectionInfo> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(HubCommand::ListConnections { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Returns the number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.list_connections().await.len()
    }

    /// Reloads chat membership for every live connection of `user_id`.
    ///
    /// Returns the number of connections updated.
    ///
    /// # Errors
    ///
    /// - `HubError::Store` if the membership lookup fails
    /// - `HubError::ChannelClosed` if the actor has shut down
    pub async fn refresh_membership(&self, user_id: UserId) -> Result<usize, HubError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(HubCommand::RefreshMembership {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::ChannelClosed)?;

        rx.await.map_err(|_| HubError::ChannelClosed)?
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
