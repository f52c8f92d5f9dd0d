//! Decoding and encoding of data frames.
//!
//! Inbound frames are JSON objects carried in text or binary WebSocket
//! frames. There is no partial-frame recovery: a frame either decodes
//! completely or the connection that produced it is considered broken.

use thiserror::Error;

use crate::message::{InboundMessage, OutboundMessage};

/// Maximum accepted inbound frame size (1 MB)
pub const MAX_FRAME_SIZE: usize = 1_048_576;

/// Errors raised while decoding or encoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodes an inbound frame using the default size limit.
pub fn decode_inbound(data: &[u8]) -> Result<InboundMessage, ProtocolError> {
    decode_inbound_with_limit(data, MAX_FRAME_SIZE)
}

/// Decodes an inbound frame, rejecting payloads larger than `max` bytes.
pub fn decode_inbound_with_limit(data: &[u8], max: usize) -> Result<InboundMessage, ProtocolError> {
    if data.len() > max {
        return Err(ProtocolError::TooLarge {
            size: data.len(),
            max,
        });
    }
    Ok(serde_json::from_slice(data)?)
}

/// Encodes an outbound message as a JSON text payload.
pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}
