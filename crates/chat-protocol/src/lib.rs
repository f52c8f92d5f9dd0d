//! chathub protocol - wire frames for real-time chat
//!
//! This crate provides the application-level messages exchanged over a
//! WebSocket between chat clients and the daemon, and the decoding rules
//! applied to inbound data frames.

pub mod message;
pub mod parse;

pub use message::{InboundMessage, OutboundMessage};
pub use parse::{decode_inbound, decode_inbound_with_limit, encode_outbound, ProtocolError, MAX_FRAME_SIZE};
