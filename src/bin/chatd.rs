//! chatd - real-time chat hub server
//!
//! Accepts authenticated WebSocket connections and fans messages out to
//! every connected member of a chat after they have been recorded.
//!
//! # Usage
//!
//! ```bash
//! # Run the server (default subcommand)
//! CHATD_JWT_SECRET=dev chatd serve
//!
//! # Issue a development token for user 1
//! CHATD_JWT_SECRET=dev chatd token --user 1
//!
//! # Print the effective configuration
//! chatd --config ./chatd.toml config
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat_core::{ChatStore, MemoryStore, UserId};
use chatd::auth::issue_token;
use chatd::config::Config;
use chatd::hub::spawn_hub;
use chatd::server::ChatServer;

/// chatd - real-time chat hub
#[derive(Parser, Debug)]
#[command(name = "chatd", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server
    Serve,
    /// Print a signed access token
    Token {
        /// User id to put in the token
        #[arg(long)]
        user: u64,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env();

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            config.validate().context("Invalid configuration")?;
            init_logging(args.json_logs)?;
            run_server(config)
        }
        Command::Token { user } => {
            config.validate().context("Invalid configuration")?;
            let token = issue_token(
                config.auth.jwt_secret.as_bytes(),
                UserId::new(user),
                config.auth.token_ttl(),
            )
            .context("Failed to issue token")?;
            println!("{token}");
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("chatd=info".parse()?)
        .add_directive("chat_core=info".parse()?)
        .add_directive("chat_protocol=info".parse()?);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "chatd starting"
    );

    if config.chats.is_empty() {
        warn!("No chats configured; every broadcast will be dropped");
    }

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let store: Arc<dyn ChatStore> = Arc::new(MemoryStore::from_seeds(&config.chats));
    let hub = spawn_hub(Arc::clone(&store), config.hub.to_hub_config());
    info!(chats = config.chats.len(), "Hub started");

    let server = ChatServer::new(&config, hub, store, cancel_token);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("chatd stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
