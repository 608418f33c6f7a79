//! Client configuration.
//!
//! Environment variables (all optional):
//! - `WSCHAT_ORIGIN`: origin of the chat page/server (default: `http://localhost:6088`)
//! - `WSCHAT_RETRY_BUDGET`: reconnect attempts before giving up (default: 5)
//! - `WSCHAT_BACKOFF_MS`: base reconnect delay, multiplied by the attempt number (default: 2000)
//! - `WSCHAT_NOTICE_MS`: how long a transient notice stays visible (default: 5000)
//! - `WSCHAT_OPTIMISTIC_ECHO`: show sent messages before the server confirms them (default: false)
//! - `WSCHAT_PERSIST`: keep the session id and log in local storage (default: true)

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;
use wschat_shared::{MAX_MESSAGE_LEN, WS_PATH};

use crate::ws::ReconnectConfig;

pub const DEFAULT_ORIGIN: &str = "http://localhost:6088";
pub const DEFAULT_STORAGE_KEY: &str = "wschat_session";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid origin `{origin}`: {detail}")]
    InvalidOrigin { origin: String, detail: String },
    #[error("unsupported origin scheme `{0}`, expected http or https")]
    UnsupportedScheme(String),
}

/// Map a page origin to the chat endpoint: `http` → `ws`, `https` → `wss`,
/// same host and port, path [`WS_PATH`].
pub fn endpoint_for_origin(origin: &Url) -> Result<Url, ConfigError> {
    let scheme = match origin.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    let host = origin.host_str().ok_or_else(|| ConfigError::InvalidOrigin {
        origin: origin.to_string(),
        detail: "missing host".to_string(),
    })?;

    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Url::parse(&format!("{scheme}://{authority}{WS_PATH}")).map_err(|e| {
        ConfigError::InvalidOrigin {
            origin: origin.to_string(),
            detail: e.to_string(),
        }
    })
}

/// Runtime settings for [`crate::ChatClient`] and its drivers.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin the endpoint is derived from.
    pub origin: String,
    pub reconnect: ReconnectConfig,
    /// Lifetime of a transient notice.
    pub notice_ttl: Duration,
    /// Native driver only: give up on a handshake after this long.
    pub connect_timeout: Duration,
    pub max_message_len: usize,
    pub optimistic_echo: bool,
    pub persist: bool,
    pub storage_key: String,
    /// Only the newest messages are written to storage.
    pub max_persisted_messages: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            reconnect: ReconnectConfig::default(),
            notice_ttl: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(10),
            max_message_len: MAX_MESSAGE_LEN,
            optimistic_echo: false,
            persist: true,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_persisted_messages: 200,
        }
    }
}

impl ClientConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(origin) = lookup("WSCHAT_ORIGIN") {
            config.origin = origin;
        }
        if let Some(budget) = parse_var::<u32>(&lookup, "WSCHAT_RETRY_BUDGET") {
            config.reconnect.max_attempts = budget;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "WSCHAT_BACKOFF_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "WSCHAT_NOTICE_MS") {
            config.notice_ttl = Duration::from_millis(ms);
        }
        if let Some(flag) = parse_flag(&lookup, "WSCHAT_OPTIMISTIC_ECHO") {
            config.optimistic_echo = flag;
        }
        if let Some(flag) = parse_flag(&lookup, "WSCHAT_PERSIST") {
            config.persist = flag;
        }

        config
    }

    /// Configuration for the page this wasm module was loaded into.
    #[cfg(target_arch = "wasm32")]
    pub fn for_current_page() -> Self {
        let origin = web_sys::window()
            .and_then(|w| w.location().origin().ok())
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        Self {
            origin,
            ..Self::default()
        }
    }

    /// The WebSocket URL to connect to.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let origin = Url::parse(&self.origin).map_err(|e| ConfigError::InvalidOrigin {
            origin: self.origin.clone(),
            detail: e.to_string(),
        })?;
        endpoint_for_origin(&origin)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            crate::log_warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            crate::log_warn!("Ignoring {}={:?}: expected true or false", key, raw);
            None
        }
    }
}
