//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with defaults matching the public
//! telemetry endpoint and the `temperature` data source.

use std::time::Duration;

use crate::error::ClientError;

/// Default WebSocket endpoint of the telemetry service.
pub const DEFAULT_URL: &str = "wss://m2.exosite.com/ws";

/// Credential used when `TELEMETRY_CIK` is not set.
pub const DEFAULT_CIK: &str = "629921c1b981291ecab0e14922eedb5044b098ca";

/// Data source alias every call targets by default.
pub const DEFAULT_ALIAS: &str = "temperature";

/// Number of readings a `read` call requests when no limit is given.
pub const DEFAULT_READ_LIMIT: u32 = 5;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`], or built in code
/// with [`ClientConfig::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,

    /// Client interface key sent in the authentication frame.
    pub cik: String,

    /// Data source alias used as the first argument of every call.
    pub alias: String,

    /// Limit used by the bootstrap read and by `log_temperature`.
    pub read_limit: u32,

    /// Seconds to wait for the authentication acknowledgment (0 = forever).
    pub auth_timeout_secs: u64,

    /// Capacity of the reading snapshot broadcast channel.
    pub reading_bus_capacity: usize,
}

impl ClientConfig {
    /// Creates a configuration for the given endpoint and credential, with
    /// every other setting at its default.
    #[must_use]
    pub fn new(url: impl Into<String>, cik: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cik: cik.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `TELEMETRY_URL` is not a
    /// `ws://` or `wss://` URL, or if `TELEMETRY_CIK` is set but empty.
    pub fn from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();

        let url = std::env::var("TELEMETRY_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ClientError::Config(format!(
                "TELEMETRY_URL must be a ws:// or wss:// URL, got {url:?}"
            )));
        }

        let cik = std::env::var("TELEMETRY_CIK").unwrap_or_else(|_| DEFAULT_CIK.to_string());
        if cik.trim().is_empty() {
            return Err(ClientError::Config("TELEMETRY_CIK is empty".to_string()));
        }

        let alias = std::env::var("TELEMETRY_ALIAS")
            .ok()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_ALIAS.to_string());

        Ok(Self {
            url,
            cik,
            alias,
            read_limit: parse_env("TELEMETRY_READ_LIMIT", DEFAULT_READ_LIMIT),
            auth_timeout_secs: parse_env("TELEMETRY_AUTH_TIMEOUT_SECS", 0),
            reading_bus_capacity: parse_env("READING_BUS_CAPACITY", 64),
        })
    }

    /// Returns the authentication timeout, or `None` when disabled.
    #[must_use]
    pub const fn auth_timeout(&self) -> Option<Duration> {
        if self.auth_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.auth_timeout_secs))
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            cik: DEFAULT_CIK.to_string(),
            alias: DEFAULT_ALIAS.to_string(),
            read_limit: DEFAULT_READ_LIMIT,
            auth_timeout_secs: 0,
            reading_bus_capacity: 64,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
pub(crate) fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_public_endpoint() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.url, DEFAULT_URL);
        assert_eq!(cfg.cik, DEFAULT_CIK);
        assert_eq!(cfg.alias, "temperature");
        assert_eq!(cfg.read_limit, 5);
        assert!(cfg.auth_timeout().is_none());
    }

    #[test]
    fn new_overrides_url_and_cik_only() {
        let cfg = ClientConfig::new("ws://127.0.0.1:9000", "abc");
        assert_eq!(cfg.url, "ws://127.0.0.1:9000");
        assert_eq!(cfg.cik, "abc");
        assert_eq!(cfg.alias, DEFAULT_ALIAS);
    }

    #[test]
    fn auth_timeout_is_enabled_by_nonzero_seconds() {
        let cfg = ClientConfig {
            auth_timeout_secs: 3,
            ..ClientConfig::default()
        };
        assert_eq!(cfg.auth_timeout(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        let value: u32 = parse_env("TELEMETRY_WS_TEST_SURELY_UNSET_KEY", 17);
        assert_eq!(value, 17);
    }
}
