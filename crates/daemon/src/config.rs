//! Configuration management for the SecureComm daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/securecomm/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::SharedKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default address the HTTP server binds to.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Default endpoint path for envelope exchanges.
pub const DEFAULT_ENDPOINT: &str = "/api";

/// Default backend URL used by the client.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:3000/api";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bind_addr must be a socket address like 127.0.0.1:3000, got {0}")]
    InvalidBindAddr(String),

    #[error("endpoint must start with '/', got {0}")]
    InvalidEndpoint(String),

    #[error("endpoint may only contain letters, digits, '/', '-', '.', '_' and '~', got {0}")]
    UnroutableEndpoint(String),

    #[error("max_body_size must be greater than 0, got {0}")]
    InvalidMaxBodySize(usize),

    #[error("backend_url must be an http:// or https:// URL, got {0}")]
    InvalidBackendUrl(String),

    #[error("timeout_secs must be between 1 and 3600 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for SecureComm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,

    /// HTTP client configuration.
    pub client: ClientConfig,

    /// Key material.
    pub crypto: CryptoConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_addr: String,

    /// Path that accepts sealed envelopes via POST.
    pub endpoint: String,

    /// Maximum accepted request body in bytes (default: 1MB).
    pub max_body_size: usize,

    /// Message placed in every sealed response.
    pub response_message: String,
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Full URL of the server endpoint.
    pub backend_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Default message sent by `securecomm send`.
    pub request_message: String,
}

/// Shared key configuration.
///
/// The key is read from `key` (hex or base64) if set, otherwise from the
/// file at `key_file`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CryptoConfig {
    /// Inline key text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Path to a file containing the key text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("key_file", &self.key_file)
            .finish()
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_body_size: 1024 * 1024, // 1MB
            response_message: "Hello from SecureComm backend!".to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: 30,
            request_message: "Hello from SecureComm client!".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("securecomm")
        .join("config.toml")
}

impl ServerConfig {
    /// Parses `bind_addr` into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))
    }
}

impl ClientConfig {
    /// Returns the request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SECURECOMM_KEY: Override the shared key (hex or base64)
    /// - SECURECOMM_BACKEND_URL: Override the client's backend URL
    /// - SECURECOMM_BIND_ADDR: Override the server's bind address
    /// - SECURECOMM_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SECURECOMM_KEY") {
            if !key.is_empty() {
                tracing::info!("Using shared key from environment");
                self.crypto.key = Some(key);
            }
        }

        if let Ok(url) = std::env::var("SECURECOMM_BACKEND_URL") {
            if !url.is_empty() {
                tracing::info!("Overriding backend_url from environment: {}", url);
                self.client.backend_url = url;
            }
        }

        if let Ok(addr) = std::env::var("SECURECOMM_BIND_ADDR") {
            if !addr.is_empty() {
                tracing::info!("Overriding bind_addr from environment: {}", addr);
                self.server.bind_addr = addr;
            }
        }

        if let Ok(level) = std::env::var("SECURECOMM_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;

        if !self.server.endpoint.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint(self.server.endpoint.clone()));
        }

        // ':' and '*' start route parameters, which the router rejects when unnamed
        if !self.server.endpoint.chars().all(is_endpoint_char) {
            return Err(ConfigError::UnroutableEndpoint(
                self.server.endpoint.clone(),
            ));
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::InvalidMaxBodySize(self.server.max_body_size));
        }

        // Validate backend_url scheme
        match url::Url::parse(&self.client.backend_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => {
                return Err(ConfigError::InvalidBackendUrl(
                    self.client.backend_url.clone(),
                ))
            }
        }

        if self.client.timeout_secs < 1 || self.client.timeout_secs > 3600 {
            return Err(ConfigError::InvalidTimeout(self.client.timeout_secs));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Resolve the shared key from the inline value or the key file.
    pub fn shared_key(&self) -> Result<SharedKey> {
        if let Some(text) = &self.crypto.key {
            return SharedKey::from_text(text).context("Invalid shared key in configuration");
        }

        if let Some(path) = &self.crypto.key_file {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read key file: {}", path.display()))?;
            return SharedKey::from_text(&text)
                .with_context(|| format!("Invalid shared key in {}", path.display()));
        }

        anyhow::bail!(
            "No shared key configured. Generate one with `securecomm keygen` and set \
             [crypto] key, [crypto] key_file or SECURECOMM_KEY"
        )
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Characters allowed in `server.endpoint`: URL-unreserved characters and '/'.
fn is_endpoint_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '.' | '_' | '~')
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
