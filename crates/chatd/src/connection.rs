//! A single authenticated client connection.
//!
//! A `Connection` is created by the upgrade handler with the user's identity
//! and chat memberships already resolved, then handed to the hub. When the
//! hub registers it, two tasks are started:
//! - the **inbound loop** decodes frames and forwards them as broadcasts
//! - the **outbound loop** drains the mailbox, writes frames with a deadline
//!   and sends keepalive pings
//!
//! The mailbox is a bounded channel owned by the hub's registry entry.
//! Removing that entry closes the mailbox, which makes the outbound loop
//! send a close frame and exit.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Loop termination is reported through `ConnectionError`, logged, and
//!   turned into a single `Unregister` command

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use chat_core::{ChatId, UserId};
use chat_protocol::{decode_inbound_with_limit, encode_outbound, OutboundMessage, ProtocolError};

use crate::hub::{HubConfig, HubHandle, RemovalReason};
use crate::transport::{Frame, FrameSink, FrameStream, TransportError};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identifier.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Connection
// ============================================================================

/// An authenticated duplex connection waiting to be registered.
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    chats: HashSet<ChatId>,
    mailbox_tx: mpsc::Sender<OutboundMessage>,
    mailbox_rx: mpsc::Receiver<OutboundMessage>,
    sink: FrameSink,
    stream: FrameStream,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("chats", &self.chats)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a connection with a mailbox of `mailbox_capacity` messages.
    pub fn new(
        user_id: UserId,
        chats: HashSet<ChatId>,
        sink: FrameSink,
        stream: FrameStream,
        mailbox_capacity: usize,
    ) -> Self {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(mailbox_capacity.max(1));
        Self {
            id: ConnectionId::next(),
            user_id,
            chats,
            mailbox_tx,
            mailbox_rx,
            sink,
            stream,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Starts the inbound and outbound loops.
    ///
    /// Returns the registry-side state: the mailbox sender is the only
    /// long-lived sender, so dropping the returned value closes the mailbox.
    pub(crate) fn start(self, hub: HubHandle, config: &HubConfig) -> LiveConnection {
        let Connection {
            id,
            user_id,
            chats,
            mailbox_tx,
            mailbox_rx,
            sink,
            stream,
        } = self;

        let outbound = OutboundLoop {
            id,
            user_id,
            sink,
            mailbox: mailbox_rx,
            hub: hub.clone(),
            write_timeout: config.write_timeout,
            ping_interval: config.ping_interval,
        };
        tokio::spawn(outbound.run());

        let inbound = InboundLoop {
            id,
            user_id,
            stream,
            hub,
            max_frame_bytes: config.max_frame_bytes,
        };
        let inbound_task = tokio::spawn(inbound.run()).abort_handle();

        LiveConnection {
            user_id,
            chats,
            mailbox: mailbox_tx,
            inbound_task,
        }
    }
}

/// Registry entry for a running connection.
#[derive(Debug)]
pub(crate) struct LiveConnection {
    pub user_id: UserId,
    pub chats: HashSet<ChatId>,
    pub mailbox: mpsc::Sender<OutboundMessage>,
    pub inbound_task: AbortHandle,
}

// ============================================================================
// Loops
// ============================================================================

/// Reads frames and forwards them to the hub as broadcasts.
struct InboundLoop {
    id: ConnectionId,
    user_id: UserId,
    stream: FrameStream,
    hub: HubHandle,
    max_frame_bytes: usize,
}

impl InboundLoop {
    async fn run(mut self) {
        match self.read_frames().await {
            Ok(()) => debug!(connection_id = %self.id, "Client closed connection"),
            Err(e) => info!(
                connection_id = %self.id,
                user_id = %self.user_id,
                error = %e,
                "Inbound loop stopped"
            ),
        }

        self.hub
            .unregister(self.id, RemovalReason::Disconnected)
            .await;
    }

    async fn read_frames(&mut self) -> Result<(), ConnectionError> {
        while let Some(frame) = self.stream.next().await {
            let data = match frame? {
                Frame::Text(text) => text.into_bytes(),
                Frame::Binary(data) => data,
                Frame::Close => return Ok(()),
                // Keepalive answers are handled by the transport
                Frame::Ping | Frame::Pong => continue,
            };

            let message = decode_inbound_with_limit(&data, self.max_frame_bytes)?;

            debug!(
                connection_id = %self.id,
                chat_id = %message.chat_id,
                "Inbound message"
            );

            self.hub
                .broadcast(self.id, self.user_id, message)
                .await
                .map_err(|_| ConnectionError::HubUnavailable)?;
        }

        Ok(())
    }
}

/// Drains the mailbox onto the transport and keeps the peer alive.
struct OutboundLoop {
    id: ConnectionId,
    user_id: UserId,
    sink: FrameSink,
    mailbox: mpsc::Receiver<OutboundMessage>,
    hub: HubHandle,
    write_timeout: Duration,
    ping_interval: Duration,
}

impl OutboundLoop {
    async fn run(mut self) {
        match self.write_frames().await {
            Ok(()) => {
                // Mailbox closed: the hub already removed us
                debug!(connection_id = %self.id, "Mailbox closed, connection finished");
            }
            Err(e) => {
                warn!(
                    connection_id = %self.id,
                    user_id = %self.user_id,
                    error = %e,
                    "Outbound loop stopped"
                );
                self.hub
                    .unregister(self.id, RemovalReason::WriteFailed)
                    .await;
            }
        }
    }

    async fn write_frames(&mut self) -> Result<(), ConnectionError> {
        let mut ticker = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.mailbox.recv() => {
                    let Some(msg) = msg else {
                        // Best effort: the peer may already be gone
                        let _ = self.write(Frame::Close).await;
                        return Ok(());
                    };
                    let json = encode_outbound(&msg)?;
                    self.write(Frame::Text(json)).await?;
                }
                _ = ticker.tick() => {
                    self.write(Frame::Ping).await?;
                    debug!(connection_id = %self.id, "Ping sent");
                }
            }
        }
    }

    /// Writes a single frame, bounded by the write deadline.
    async fn write(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        match timeout(self.write_timeout, self.sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Errors that end a connection loop.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Hub unavailable")]
    HubUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubCommand;
    use crate::transport::memory::{self, MemoryPeer};

    fn test_config() -> HubConfig {
        HubConfig {
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(60),
            ..HubConfig::default()
        }
    }

    fn start_connection(
        transport_buffer: usize,
        mailbox: usize,
    ) -> (
        ConnectionId,
        LiveConnection,
        MemoryPeer,
        mpsc::Receiver<HubCommand>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let hub = HubHandle::new(cmd_tx);
        let (sink, stream, peer) = memory::pair(transport_buffer);
        let chats = HashSet::from([ChatId::new(1)]);
        let conn = Connection::new(UserId::new(7), chats, sink, stream, mailbox);
        let id = conn.id();
        let live = conn.start(hub, &test_config());
        (id, live, peer, cmd_rx)
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
        assert!(a.to_string().starts_with("conn-"));
    }

    #[tokio::test]
    async fn test_inbound_frame_becomes_broadcast() {
        let (id, _live, peer, mut cmd_rx) = start_connection(8, 8);

        assert!(peer.send_text(r#"{"chat_id": 1, "content": "hi"}"#).await);

        match cmd_rx.recv().await {
            Some(HubCommand::Broadcast {
                connection_id,
                sender_id,
                message,
                respond_to,
            }) => {
                assert_eq!(connection_id, id);
                assert_eq!(sender_id, UserId::new(7));
                assert_eq!(message.chat_id, ChatId::new(1));
                assert_eq!(message.content, "hi");
                assert!(respond_to.is_none());
            }
            other => panic!("Expected broadcast, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_binary_frames_are_decoded() {
        let (_id, _live, peer, mut cmd_rx) = start_connection(8, 8);

        peer.send(Frame::Binary(br#"{"chat_id": 1, "content": "bin"}"#.to_vec()))
            .await;

        assert!(matches!(
            cmd_rx.recv().await,
            Some(HubCommand::Broadcast { message, .. }) if message.content == "bin"
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_unregisters() {
        let (id, _live, peer, mut cmd_rx) = start_connection(8, 8);

        peer.send_text("{ not json").await;

        match cmd_rx.recv().await {
            Some(HubCommand::Unregister {
                connection_id,
                reason,
            }) => {
                assert_eq!(connection_id, id);
                assert_eq!(reason, RemovalReason::Disconnected);
            }
            other => panic!("Expected unregister, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_peer_close_unregisters() {
        let (id, _live, peer, mut cmd_rx) = start_connection(8, 8);

        peer.send(Frame::Close).await;

        assert!(matches!(
            cmd_rx.recv().await,
            Some(HubCommand::Unregister { connection_id, .. }) if connection_id == id
        ));
    }

    #[tokio::test]
    async fn test_mailbox_messages_are_written() {
        let (_id, live, mut peer, _cmd_rx) = start_connection(8, 8);

        let msg = OutboundMessage {
            chat_id: ChatId::new(1),
            content: "hello".to_string(),
            sender_id: UserId::new(2),
        };
        live.mailbox.send(msg).await.unwrap();

        match peer.recv().await {
            Some(Frame::Text(json)) => {
                let decoded: OutboundMessage = serde_json::from_str(&json).unwrap();
                assert_eq!(decoded.content, "hello");
                assert_eq!(decoded.sender_id, UserId::new(2));
            }
            other => panic!("Expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_mailbox_sends_close_frame() {
        let (_id, live, mut peer, mut cmd_rx) = start_connection(8, 8);

        drop(live);

        assert_eq!(peer.recv().await, Some(Frame::Close));
        // Outbound loop exits without asking for a second unregister
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_sent_after_interval() {
        let (_id, _live, mut peer, _cmd_rx) = start_connection(8, 8);

        assert_eq!(peer.recv().await, Some(Frame::Ping));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_unregisters() {
        // One transport slot that the peer never drains
        let (id, live, _peer, mut cmd_rx) = start_connection(1, 8);

        for i in 0..2 {
            let msg = OutboundMessage {
                chat_id: ChatId::new(1),
                content: format!("m{i}"),
                sender_id: UserId::new(2),
            };
            live.mailbox.send(msg).await.unwrap();
        }

        match cmd_rx.recv().await {
            Some(HubCommand::Unregister {
                connection_id,
                reason,
            }) => {
                assert_eq!(connection_id, id);
                assert_eq!(reason, RemovalReason::WriteFailed);
            }
            other => panic!("Expected unregister, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_error_display() {
        assert_eq!(ConnectionError::WriteTimeout.to_string(), "Write timeout");
        let err = ConnectionError::from(TransportError::Closed);
        assert!(err.to_string().contains("Connection closed"));
    }
}
