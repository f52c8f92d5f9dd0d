//! chatd - real-time chat hub and WebSocket server
//!
//! This crate provides the core infrastructure for the chat daemon:
//! - `hub` - Actor owning the connection registry and message fan-out
//! - `connection` - Per-client inbound/outbound loops
//! - `transport` - Frame-level duplex abstraction (axum WebSocket, in-memory)
//! - `server` - axum upgrade gateway
//! - `auth` / `config` - access tokens and daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        chatd                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│         HubActor            │   │
//! │  │  (axum, /ws)    │     │  (connection registry owner)│   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ upgrade                     │ try_send          │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  inbound loop   │     │  mailbox ─▶ outbound loop   │   │
//! │  │  (per client)   │     │        (per client)         │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod auth;
pub mod config;
pub mod connection;
pub mod hub;
pub mod server;
pub mod transport;
