//! Daemon configuration.
//!
//! Loaded from a TOML file with every field optional:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! allowed_origins = ["https://chat.example.com"]
//!
//! [auth]
//! jwt_secret = "..."
//! token_ttl_secs = 900
//!
//! [hub]
//! mailbox_capacity = 256
//! write_timeout_secs = 10
//! ping_interval_secs = 60
//!
//! [[chats]]
//! id = 1
//! name = "general"
//! members = [1, 2]
//! ```
//!
//! `CHATD_BIND` and `CHATD_JWT_SECRET` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chat_core::ChatSeed;
use chat_protocol::MAX_FRAME_SIZE;

use crate::hub::HubConfig;

/// Environment variable overriding `server.bind`
pub const BIND_ENV: &str = "CHATD_BIND";

/// Environment variable overriding `auth.jwt_secret`
pub const JWT_SECRET_ENV: &str = "CHATD_JWT_SECRET";

/// Placeholder printed instead of a configured secret
pub const REDACTED: &str = "<redacted>";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub hub: HubSection,
    pub chats: Vec<ChatSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Socket address to listen on
    pub bind: String,
    /// Accepted `Origin` header values; empty accepts any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// HS256 signing secret
    pub jwt_secret: String,
    /// Lifetime of tokens issued by `chatd token`
    pub token_ttl_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 900,
        }
    }
}

impl AuthSection {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSection {
    pub command_buffer: usize,
    pub mailbox_capacity: usize,
    pub write_timeout_secs: u64,
    pub ping_interval_secs: u64,
    pub max_frame_bytes: usize,
    pub require_sender_membership: bool,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            command_buffer: 100,
            mailbox_capacity: 256,
            write_timeout_secs: 10,
            ping_interval_secs: 60,
            max_frame_bytes: MAX_FRAME_SIZE,
            require_sender_membership: false,
        }
    }
}

impl HubSection {
    pub fn to_hub_config(&self) -> HubConfig {
        HubConfig {
            command_buffer: self.command_buffer,
            mailbox_capacity: self.mailbox_capacity,
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            max_frame_bytes: self.max_frame_bytes,
            require_sender_membership: self.require_sender_membership,
        }
    }
}

/// Default config location: `<config dir>/chathub/chatd.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chathub").join("chatd.toml"))
}

impl Config {
    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        contents.parse()
    }

    /// Applies `CHATD_BIND` / `CHATD_JWT_SECRET` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(BIND_ENV).ok(),
            std::env::var(JWT_SECRET_ENV).ok(),
        );
    }

    pub fn apply_overrides(&mut self, bind: Option<String>, jwt_secret: Option<String>) {
        if let Some(bind) = bind.filter(|b| !b.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(secret) = jwt_secret.filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = secret;
        }
    }

    /// Checks values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "auth.jwt_secret is empty (set it in the config file or {JWT_SECRET_ENV})"
            )));
        }

        let hub = &self.hub;
        let zero_checks = [
            ("hub.command_buffer", hub.command_buffer as u64),
            ("hub.mailbox_capacity", hub.mailbox_capacity as u64),
            ("hub.write_timeout_secs", hub.write_timeout_secs),
            ("hub.ping_interval_secs", hub.ping_interval_secs),
            ("hub.max_frame_bytes", hub.max_frame_bytes as u64),
        ];
        for (name, value) in zero_checks {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }

        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind is empty".to_string()));
        }

        Ok(())
    }

    /// Renders the configuration as TOML with `auth.jwt_secret` masked.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if !shown.auth.jwt_secret.is_empty() {
            shown.auth.jwt_secret = REDACTED.to_string();
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
