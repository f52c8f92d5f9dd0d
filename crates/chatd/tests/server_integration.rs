//! Integration tests for the WebSocket server.
//!
//! These tests run `ChatServer` on a loopback TCP port and talk to it with
//! a real WebSocket client, covering authentication, origin checks,
//! message delivery and disconnect handling.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_core::{ChatId, ChatSeed, ChatStore, MemoryStore, UserId};
use chat_protocol::OutboundMessage;
use chatd::auth::issue_token;
use chatd::config::Config;
use chatd::hub::{spawn_hub, HubHandle};
use chatd::server::ChatServer;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for a message or registry change
const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between registry polls
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const SECRET: &str = "integration-secret";

const GENERAL: ChatId = ChatId::new(1);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle.
struct TestServer {
    addr: SocketAddr,
    hub: HubHandle,
    store: Arc<MemoryStore>,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawns a server with chat 1 = {1, 2}; `customize` may adjust the config.
    async fn spawn_with(customize: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.server.bind = "127.0.0.1:0".to_string();
        config.auth.jwt_secret = SECRET.to_string();
        config.chats = vec![ChatSeed {
            id: GENERAL,
            name: "general".to_string(),
            members: vec![UserId::new(1), UserId::new(2)],
        }];
        customize(&mut config);
        config.validate().unwrap();

        let store = Arc::new(MemoryStore::from_seeds(&config.chats));
        let dyn_store: Arc<dyn ChatStore> = store.clone();
        let hub = spawn_hub(dyn_store.clone(), config.hub.to_hub_config());
        let cancel_token = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = ChatServer::new(&config, hub.clone(), dyn_store, cancel_token.clone());
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            addr,
            hub,
            store,
            cancel_token,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/v1/chat/ws", self.addr)
    }

    fn token(user: u64) -> String {
        issue_token(SECRET.as_bytes(), UserId::new(user), Duration::from_secs(60)).unwrap()
    }

    /// Connects as `user` with a bearer header and waits until registered.
    async fn connect(&self, user: u64) -> Client {
        let before = self.hub.connection_count().await;
        let mut request = self.url().into_client_request().unwrap();
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", Self::token(user))).unwrap(),
        );
        let (client, _) = connect_async(request).await.expect("connect");
        self.wait_for_count(before + 1).await;
        client
    }

    async fn wait_for_count(&self, expected: usize) {
        let result = timeout(WAIT_TIMEOUT, async {
            while self.hub.connection_count().await != expected {
                sleep(POLL_INTERVAL).await;
            }
        })
        .await;
        assert!(result.is_ok(), "connection count did not reach {expected}");
    }

    /// Issues a plain HTTP GET and returns the raw response.
    async fn http_get(&self, path: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        timeout(WAIT_TIMEOUT, stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();
        response
    }

    fn shutdown(self) {
        self.cancel_token.cancel();
    }
}

async fn send(client: &mut Client, chat: ChatId, content: &str) {
    let frame = serde_json::json!({ "chat_id": chat, "content": content }).to_string();
    client.send(Message::text(frame)).await.unwrap();
}

/// Receives the next chat message, skipping control frames.
async fn recv(client: &mut Client) -> OutboundMessage {
    loop {
        let msg = timeout(WAIT_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

fn assert_http_status(err: WsError, expected: u16) {
    match err {
        WsError::Http(response) => assert_eq!(response.status().as_u16(), expected),
        other => panic!("expected HTTP {expected} rejection, got {other:?}"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_healthz() {
    let server = TestServer::spawn().await;

    let response = server.http_get("/healthz").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#""status":"ok""#), "{response}");
    assert!(response.contains(r#""connections":0"#), "{response}");

    server.shutdown();
}

#[tokio::test]
async fn test_message_round_trip_between_members() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect(1).await;
    let mut bob = server.connect(2).await;

    send(&mut alice, GENERAL, "hi").await;

    let msg = recv(&mut bob).await;
    assert_eq!(msg.chat_id, GENERAL);
    assert_eq!(msg.content, "hi");
    assert_eq!(msg.sender_id, UserId::new(1));

    assert_eq!(recv(&mut alice).await.content, "hi");
    assert_eq!(server.store.history(GENERAL).await.len(), 1);

    server.shutdown();
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let server = TestServer::spawn().await;

    let err = connect_async(server.url()).await.unwrap_err();
    assert_http_status(err, 401);
    assert_eq!(server.hub.connection_count().await, 0);

    server.shutdown();
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let server = TestServer::spawn().await;

    let forged = issue_token(b"wrong-secret", UserId::new(1), Duration::from_secs(60)).unwrap();
    let err = connect_async(format!("{}?token={forged}", server.url()))
        .await
        .unwrap_err();
    assert_http_status(err, 401);

    server.shutdown();
}

#[tokio::test]
async fn test_query_token_accepted() {
    let server = TestServer::spawn().await;

    let url = format!("{}?token={}", server.url(), TestServer::token(2));
    let (_client, _) = connect_async(url).await.unwrap();
    server.wait_for_count(1).await;

    let infos = server.hub.list_connections().await;
    assert_eq!(infos[0].user_id, UserId::new(2));
    assert_eq!(infos[0].chats, vec![GENERAL]);

    server.shutdown();
}

#[tokio::test]
async fn test_origin_allow_list() {
    let server = TestServer::spawn_with(|config| {
        config.server.allowed_origins = vec!["https://chat.example.com".to_string()];
    })
    .await;

    let request_with_origin = |origin: &'static str| {
        let url = format!("{}?token={}", server.url(), TestServer::token(1));
        let mut request = url.into_client_request().unwrap();
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static(origin));
        request
    };

    let err = connect_async(request_with_origin("https://evil.example.com"))
        .await
        .unwrap_err();
    assert_http_status(err, 403);

    let (_client, _) = connect_async(request_with_origin("https://chat.example.com"))
        .await
        .unwrap();
    server.wait_for_count(1).await;

    server.shutdown();
}

#[tokio::test]
async fn test_client_close_unregisters() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect(1).await;
    let _bob = server.connect(2).await;

    alice.close(None).await.unwrap();

    server.wait_for_count(1).await;
    server.shutdown();
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let server = TestServer::spawn().await;
    let mut alice = server.connect(1).await;

    alice.send(Message::text("{ not json")).await.unwrap();

    server.wait_for_count(0).await;

    // The server says goodbye with a close frame
    let next = timeout(WAIT_TIMEOUT, alice.next()).await.unwrap();
    assert!(matches!(next, Some(Ok(Message::Close(_))) | None | Some(Err(_))));

    server.shutdown();
}
