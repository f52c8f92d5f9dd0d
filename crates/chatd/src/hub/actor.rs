//! Hub actor - owns the connection registry and processes commands.
//!
//! The HubActor is the single owner of the connection registry. Every
//! register, unregister and broadcast goes through its command channel and
//! is processed in arrival order, so no locks guard the registry.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Store failures abort the affected broadcast and are logged
//! - Response channel send failures are ignored (caller went away)

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use chat_core::{ChatId, ChatStore, UserId};
use chat_protocol::InboundMessage;

use super::commands::{
    BroadcastError, BroadcastOutcome, ConnectionInfo, HubCommand, HubError, RemovalReason,
};
use super::{HubConfig, HubHandle};
use crate::connection::{Connection, ConnectionId, LiveConnection};

// ============================================================================
// Hub Actor
// ============================================================================

/// The hub actor - owns all connection state.
///
/// # Ownership
///
/// The actor owns `connections`, the registry entry of each live connection.
/// An entry holds the only long-lived sender of the connection's mailbox;
/// removing it closes the mailbox and aborts the connection's inbound task.
///
/// # Ordering
///
/// A broadcast awaits the store before fanning out. Commands queue behind
/// it, so messages from one connection are delivered in the order they
/// were read.
pub struct HubActor {
    /// Command receiver
    receiver: mpsc::Receiver<HubCommand>,

    /// Used to hand fresh handles to connection loops without keeping the
    /// command channel open on the actor's own behalf
    self_sender: mpsc::WeakSender<HubCommand>,

    /// Persistence gateway
    store: Arc<dyn ChatStore>,

    config: HubConfig,

    connections: HashMap<ConnectionId, LiveConnection>,
}

impl HubActor {
    pub fn new(
        receiver: mpsc::Receiver<HubCommand>,
        self_sender: mpsc::WeakSender<HubCommand>,
        store: Arc<dyn ChatStore>,
        config: HubConfig,
    ) -> Self {
        Self {
            receiver,
            self_sender,
            store,
            config,
            connections: HashMap::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until every handle (including those held by
    /// connection loops) is dropped.
    pub async fn run(mut self) {
        info!("Hub actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(
            "Hub actor stopped (connections: {})",
            self.connections.len()
        );
    }

    /// Dispatches a command to the appropriate handler.
    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register {
                connection,
                respond_to,
            } => {
                let id = self.handle_register(*connection);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(id);
            }
            HubCommand::Unregister {
                connection_id,
                reason,
            } => {
                self.handle_unregister(connection_id, reason);
            }
            HubCommand::Broadcast {
                connection_id,
                sender_id,
                message,
                respond_to,
            } => {
                let result = self
                    .handle_broadcast(connection_id, sender_id, message)
                    .await;
                log_broadcast_result(connection_id, sender_id, &result);
                if let Some(tx) = respond_to {
                    let _ = tx.send(result);
                }
            }
            HubCommand::ListConnections { respond_to } => {
                let _ = respond_to.send(self.handle_list_connections());
            }
            HubCommand::RefreshMembership {
                user_id,
                respond_to,
            } => {
                let result = self.handle_refresh_membership(user_id).await;
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Handles connection registration.
    ///
    /// Starts the connection's loops and stores its registry entry. An
    /// existing entry under the same id is replaced.
    fn handle_register(&mut self, connection: Connection) -> ConnectionId {
        let id = connection.id();
        let user_id = connection.user_id();

        let Some(sender) = self.self_sender.upgrade() else {
            // Every handle is gone; the connection is dropped and its socket closes
            warn!(connection_id = %id, "Hub shutting down, rejecting connection");
            return id;
        };

        let live = connection.start(HubHandle::new(sender), &self.config);
        let chat_count = live.chats.len();

        if let Some(previous) = self.connections.insert(id, live) {
            previous.inbound_task.abort();
            debug!(connection_id = %id, "Replaced existing registry entry");
        }

        info!(
            connection_id = %id,
            user_id = %user_id,
            chats = chat_count,
            total_connections = self.connections.len(),
            "Connection registered"
        );

        id
    }

    /// Handles connection removal. Returns whether an entry was removed.
    fn handle_unregister(&mut self, connection_id: ConnectionId, reason: RemovalReason) -> bool {
        let Some(entry) = self.connections.remove(&connection_id) else {
            debug!(connection_id = %connection_id, reason = %reason, "Unregister for unknown connection");
            return false;
        };

        // Dropping the entry closes the mailbox; the outbound loop sends a
        // close frame and exits on its own.
        entry.inbound_task.abort();

        info!(
            connection_id = %connection_id,
            user_id = %entry.user_id,
            reason = %reason,
            remaining_connections = self.connections.len(),
            "Connection unregistered"
        );

        true
    }

    /// Handles a broadcast: check, persist, then fan out.
    async fn handle_broadcast(
        &mut self,
        connection_id: ConnectionId,
        sender_id: UserId,
        message: InboundMessage,
    ) -> Result<BroadcastOutcome, BroadcastError> {
        let chat_id = message.chat_id;

        if !self.store.chat_exists(chat_id).await? {
            return Err(BroadcastError::ChatNotFound(chat_id));
        }

        if self.config.require_sender_membership && !self.is_member(connection_id, chat_id) {
            return Err(BroadcastError::SenderNotMember { sender_id, chat_id });
        }

        self.store
            .record_message(chat_id, sender_id, &message.content)
            .await?;

        let outbound = message.from_sender(sender_id);
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, entry) in &self.connections {
            if !entry.chats.contains(&chat_id) {
                continue;
            }
            match entry.mailbox.try_send(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => failed.push((*id, RemovalReason::SlowConsumer)),
                Err(TrySendError::Closed(_)) => failed.push((*id, RemovalReason::MailboxClosed)),
            }
        }

        let mut evicted = Vec::with_capacity(failed.len());
        for (id, reason) in failed {
            warn!(connection_id = %id, chat_id = %chat_id, reason = %reason, "Evicting connection");
            if self.handle_unregister(id, reason) {
                evicted.push(id);
            }
        }

        Ok(BroadcastOutcome { delivered, evicted })
    }

    /// Handles listing all connections.
    fn handle_list_connections(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .iter()
            .map(|(id, entry)| {
                let mut chats: Vec<ChatId> = entry.chats.iter().copied().collect();
                chats.sort_unstable();
                ConnectionInfo {
                    id: *id,
                    user_id: entry.user_id,
                    chats,
                }
            })
            .collect();
        infos.sort_unstable_by_key(|info| info.id);
        infos
    }

    /// Handles a membership refresh for every live connection of a user.
    async fn handle_refresh_membership(&mut self, user_id: UserId) -> Result<usize, HubError> {
        let chats = self.store.chat_ids_for_user(user_id).await?;

        let mut updated = 0;
        for entry in self.connections.values_mut() {
            if entry.user_id == user_id {
                entry.chats = chats.clone();
                updated += 1;
            }
        }

        info!(
            user_id = %user_id,
            chats = chats.len(),
            connections = updated,
            "Membership refreshed"
        );

        Ok(updated)
    }

    fn is_member(&self, connection_id: ConnectionId, chat_id: ChatId) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|entry| entry.chats.contains(&chat_id))
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of connections currently registered.
    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

fn log_broadcast_result(
    connection_id: ConnectionId,
    sender_id: UserId,
    result: &Result<BroadcastOutcome, BroadcastError>,
) {
    match result {
        Ok(outcome) => debug!(
            connection_id = %connection_id,
            sender_id = %sender_id,
            delivered = outcome.delivered,
            evicted = outcome.evicted.len(),
            "Message broadcast"
        ),
        Err(BroadcastError::Store(e)) => error!(
            connection_id = %connection_id,
            sender_id = %sender_id,
            error = %e,
            "Broadcast aborted: store failure"
        ),
        Err(e) => warn!(
            connection_id = %connection_id,
            sender_id = %sender_id,
            error = %e,
            "Broadcast dropped"
        ),
    }
}
