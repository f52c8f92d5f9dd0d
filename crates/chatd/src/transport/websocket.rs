//! axum WebSocket adapter.

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{future, SinkExt, StreamExt};

use super::{Frame, FrameSink, FrameStream, TransportError};

/// Splits an upgraded WebSocket into a frame sink and frame stream.
pub fn split(socket: WebSocket) -> (FrameSink, FrameStream) {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(TransportError::from)
        .with(|frame: Frame| future::ready(Ok::<Message, TransportError>(frame.into())));

    let stream = stream.map(|result| result.map(Frame::from).map_err(TransportError::from));

    (Box::pin(sink), Box::pin(stream))
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data.to_vec()),
            Message::Ping(_) => Frame::Ping,
            Message::Pong(_) => Frame::Pong,
            Message::Close(_) => Frame::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping => Message::Ping(Bytes::new()),
            Frame::Pong => Message::Pong(Bytes::new()),
            Frame::Close => Message::Close(None),
        }
    }
}
