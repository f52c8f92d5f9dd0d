//! In-process duplex transport.
//!
//! [`pair`] returns the server side of a connection together with a
//! [`MemoryPeer`] that plays the client. Frames written by the server queue
//! up in a bounded channel; a peer that never calls [`MemoryPeer::recv`]
//! behaves like a stalled network client once that buffer is full.

use futures_util::{stream, SinkExt};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use super::{Frame, FrameSink, FrameStream, TransportError};

/// Client end of an in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
    to_server: mpsc::Sender<Result<Frame, TransportError>>,
    from_server: mpsc::Receiver<Frame>,
}

impl MemoryPeer {
    /// Sends a text frame to the server. Returns `false` if the server side is gone.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into())).await
    }

    /// Sends an arbitrary frame to the server.
    pub async fn send(&self, frame: Frame) -> bool {
        self.to_server.send(Ok(frame)).await.is_ok()
    }

    /// Injects a transport failure into the server's read side.
    pub async fn fail(&self, error: TransportError) -> bool {
        self.to_server.send(Err(error)).await.is_ok()
    }

    /// Receives the next frame written by the server.
    ///
    /// Returns `None` once the server dropped its sink.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.recv().await
    }

    /// Returns a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_server.try_recv().ok()
    }
}

/// Creates a connected server/peer pair with `buffer` slots in each direction.
pub fn pair(buffer: usize) -> (FrameSink, FrameStream, MemoryPeer) {
    let buffer = buffer.max(1);
    let (server_tx, peer_rx) = mpsc::channel::<Frame>(buffer);
    let (peer_tx, server_rx) = mpsc::channel::<Result<Frame, TransportError>>(buffer);

    let sink = PollSender::new(server_tx).sink_map_err(|_| TransportError::Closed);
    let stream = stream::unfold(server_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let peer = MemoryPeer {
        to_server: peer_tx,
        from_server: peer_rx,
    };

    (Box::pin(sink), Box::pin(stream), peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (mut sink, mut stream, mut peer) = pair(4);

        assert!(peer.send_text("hello").await);
        assert_eq!(
            stream.next().await,
            Some(Ok(Frame::Text("hello".to_string())))
        );

        sink.send(Frame::Ping).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Ping));
    }

    #[tokio::test]
    async fn test_stream_ends_when_peer_dropped() {
        let (_sink, mut stream, peer) = pair(1);
        drop(peer);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_sink_errors_when_peer_dropped() {
        let (mut sink, _stream, peer) = pair(1);
        drop(peer);
        assert_eq!(sink.send(Frame::Ping).await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let (_sink, mut stream, peer) = pair(1);
        peer.fail(TransportError::Io("reset".to_string())).await;
        assert_eq!(
            stream.next().await,
            Some(Err(TransportError::Io("reset".to_string())))
        );
    }
}
