//! Chat hub using the Actor pattern.
//!
//! The hub is the central state manager for all live client connections.
//! It receives commands via a tokio mpsc channel and owns the only copy of
//! the connection registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Register   ┌─────────────┐  try_send   ┌──────────────┐
//! │ WS upgrade   │────────────▶│  HubActor   │────────────▶│  mailbox     │
//! └──────────────┘             └─────────────┘             └──────────────┘
//!                                 ▲      │                        │
//!              Broadcast /        │      │ chat_exists,           ▼
//!              Unregister         │      │ record_message  ┌──────────────┐
//! ┌──────────────┐                │      ▼                 │ outbound loop│──▶ client
//! │ inbound loop │────────────────┘  ChatStore             └──────────────┘
//! └──────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;
use std::time::Duration;

use chat_core::ChatStore;
use chat_protocol::MAX_FRAME_SIZE;
use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::HubActor;
pub use commands::{
    BroadcastError, BroadcastOutcome, ConnectionInfo, HubCommand, HubError, RemovalReason,
};
pub use handle::HubHandle;

/// Runtime settings for the hub and the connection loops it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the hub command channel
    pub command_buffer: usize,
    /// Per-connection mailbox capacity
    pub mailbox_capacity: usize,
    /// Deadline for a single frame write
    pub write_timeout: Duration,
    /// Interval between keepalive pings
    pub ping_interval: Duration,
    /// Largest inbound data frame accepted
    pub max_frame_bytes: usize,
    /// Drop broadcasts whose sender is not a member of the target chat
    pub require_sender_membership: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: 100,
            mailbox_capacity: 256,
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(60),
            max_frame_bytes: MAX_FRAME_SIZE,
            require_sender_membership: false,
        }
    }
}

/// Spawn the hub actor and return a handle for interaction.
///
/// The actor runs until every handle, including the ones held by
/// connection loops, has been dropped.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chat_core::MemoryStore;
/// use chatd::hub::{spawn_hub, HubConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let hub = spawn_hub(Arc::new(MemoryStore::new()), HubConfig::default());
///     let connections = hub.list_connections().await;
///     assert!(connections.is_empty());
/// }
/// ```
pub fn spawn_hub(store: Arc<dyn ChatStore>, config: HubConfig) -> HubHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));

    let actor = HubActor::new(cmd_rx, cmd_tx.downgrade(), store, config);
    tokio::spawn(actor.run());

    HubHandle::new(cmd_tx)
}
