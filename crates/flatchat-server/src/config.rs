//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use flatchat_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT, DEFAULT_POLL_LIMIT, INACTIVITY_SECS};
use flatchat_store::ChatOptions;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Directory holding `chat.log` and `users.json`.
    /// Env: `CHAT_DATA_DIR`
    /// Default: `./chat_data`
    pub data_dir: PathBuf,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"flatchat"`
    pub instance_name: String,

    /// Seconds without a poll or post before a user is dropped.
    /// Env: `INACTIVITY_SECS`
    /// Default: `1800`
    pub inactivity_secs: i64,

    /// Trailing log lines considered per poll. Older messages beyond this
    /// window are not delivered, even to sessions that could see them.
    /// Env: `POLL_LIMIT`
    /// Default: `2000`
    pub poll_limit: usize,

    /// Permission bits for the data directory and files, octal (e.g. `660`).
    /// Env: `FILE_MODE`
    /// Default: unset (process umask applies).
    pub file_mode: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            data_dir: PathBuf::from("./chat_data"),
            instance_name: APP_NAME.to_string(),
            inactivity_secs: INACTIVITY_SECS,
            poll_limit: DEFAULT_POLL_LIMIT,
            file_mode: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("CHAT_DATA_DIR") {
            if !path.trim().is_empty() {
                config.data_dir = PathBuf::from(path);
            }
        }

        if let Some(name) = var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(val) = var("INACTIVITY_SECS") {
            match val.trim().parse::<i64>() {
                Ok(n) if n > 0 => config.inactivity_secs = n,
                _ => tracing::warn!(value = %val, "Invalid INACTIVITY_SECS, using default"),
            }
        }

        if let Some(val) = var("POLL_LIMIT") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.poll_limit = n,
                _ => tracing::warn!(value = %val, "Invalid POLL_LIMIT, using default"),
            }
        }

        if let Some(val) = var("FILE_MODE") {
            match parse_octal_mode(&val) {
                Ok(mode) => config.file_mode = Some(mode),
                Err(e) => tracing::warn!(error = %e, "Invalid FILE_MODE, leaving modes alone"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            inactivity_secs: self.inactivity_secs,
            poll_limit: self.poll_limit,
            file_mode: self.file_mode,
        }
    }
}

/// Parse permission bits written in octal, with or without a `0o`/`0`
/// prefix.
fn parse_octal_mode(raw: &str) -> Result<u32, String> {
    let s = raw.trim();
    let digits = s.strip_prefix("0o").unwrap_or(s);
    if digits.is_empty() {
        return Err("empty mode".to_string());
    }
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|e| format!("not an octal mode '{s}': {e}"))?;
    if mode > 0o7777 {
        return Err(format!("mode out of range: {s}"));
    }
    Ok(mode)
}
