//! chat - terminal client for chatd
//!
//! Reads `<chat_id> <text>` lines from stdin and prints every message
//! delivered to the authenticated user.
//!
//! # Usage
//!
//! ```bash
//! chat --token "$(chatd token --user 1)"
//! > 1 hello everyone
//! [chat 1] user 1: hello everyone
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use chat_core::ChatId;
use chat_protocol::{InboundMessage, OutboundMessage};

/// Environment variable holding the access token
const TOKEN_ENV: &str = "CHAT_TOKEN";

/// chat - terminal client for chatd
#[derive(Parser, Debug)]
#[command(name = "chat", version, about)]
struct Args {
    /// WebSocket endpoint
    #[arg(long, default_value = "ws://127.0.0.1:8080/v1/chat/ws")]
    url: String,

    /// Access token (falls back to $CHAT_TOKEN)
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let token = match args.token {
        Some(token) => token,
        None => std::env::var(TOKEN_ENV)
            .with_context(|| format!("No token given (use --token or {TOKEN_ENV})"))?,
    };

    let mut request = args
        .url
        .as_str()
        .into_client_request()
        .context("Invalid server URL")?;
    request.headers_mut().insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).context("Invalid token")?,
    );

    let (socket, _response) = connect_async(request)
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    eprintln!("Connected to {}", args.url);

    let (mut write, mut read) = socket.split();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(msg) => {
                        let json = serde_json::to_string(&msg)?;
                        write.send(Message::text(json)).await.context("Failed to send")?;
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<OutboundMessage>(text.as_str()) {
                            Ok(msg) => println!("{}", format_message(&msg)),
                            Err(_) => println!("{}", text.as_str()),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        eprintln!("Connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => bail!("Connection error: {e}"),
                }
            }
        }
    }

    let _ = write.send(Message::Close(None)).await;
    Ok(())
}

/// Parses `<chat_id> <text>`.
fn parse_line(line: &str) -> Result<InboundMessage> {
    let (chat, text) = line
        .trim()
        .split_once(' ')
        .context("Expected: <chat_id> <text>")?;
    let chat_id: u64 = chat
        .parse()
        .with_context(|| format!("Invalid chat id: {chat}"))?;
    Ok(InboundMessage::new(ChatId::new(chat_id), text.trim()))
}

fn format_message(msg: &OutboundMessage) -> String {
    format!("[chat {}] user {}: {}", msg.chat_id, msg.sender_id, msg.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::UserId;

    #[test]
    fn test_parse_line() {
        let msg = parse_line("7 hello there").unwrap();
        assert_eq!(msg.chat_id, ChatId::new(7));
        assert_eq!(msg.content, "hello there");

        assert!(parse_line("hello").is_err());
        assert!(parse_line("x hello").is_err());
    }

    #[test]
    fn test_format_message() {
        let msg = OutboundMessage {
            chat_id: ChatId::new(1),
            content: "hi".to_string(),
            sender_id: UserId::new(2),
        };
        assert_eq!(format_message(&msg), "[chat 1] user 2: hi");
    }
}
