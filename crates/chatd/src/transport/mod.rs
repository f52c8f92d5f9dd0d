//! Duplex frame transport underneath a [`Connection`](crate::connection::Connection).
//!
//! The hub and the connection loops only see [`Frame`]s flowing through a
//! boxed sink/stream pair. This keeps `Connection` a concrete type that can
//! travel through the hub's command channel regardless of whether the bytes
//! come from an axum WebSocket or from an in-process peer.

pub mod memory;
pub mod websocket;

use std::pin::Pin;

use futures_util::{Sink, Stream};
use thiserror::Error;

/// A single transport-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 data frame
    Text(String),
    /// Binary data frame
    Binary(Vec<u8>),
    /// Keepalive probe
    Ping,
    /// Keepalive answer
    Pong,
    /// Orderly close
    Close,
}

/// Errors raised by the underlying duplex connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Transport error: {0}")]
    Io(String),
}

/// Outbound half of a duplex connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a duplex connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;
