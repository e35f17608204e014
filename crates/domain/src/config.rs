//! Session configuration
//!
//! Every field except `auth_base_url` and `client_key` has a default, so a
//! minimal JSON or TOML document only needs those two keys.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_REFRESH_BUFFER_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TRANSIENT_RETRY_SECS,
    DEFAULT_VALIDATION_INTERVAL_SECS,
};
use crate::errors::ConfigError;
use crate::types::CustodyMode;

/// Configuration for one session manager instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SessionConfig {
    /// Base URL of the auth backend, e.g. `https://auth.example.com/auth`.
    pub auth_base_url: String,
    /// Client identifier registered with the auth backend.
    pub client_key: String,
    /// Base URL of the centralized account UI. Required for centralized login.
    pub account_ui_base_url: Option<String>,
    /// Refresh-token custody. Derived from `auth_base_url` when absent.
    pub custody_mode: Option<CustodyMode>,
    pub proactive_refresh_enabled: bool,
    /// Seconds before expiry at which the proactive refresh fires.
    pub refresh_buffer_secs: u64,
    /// Backoff after a transient refresh failure.
    pub transient_retry_secs: u64,
    /// Period of the server-side session validation.
    pub validation_interval_secs: u64,
    pub visibility_validation_enabled: bool,
    /// Start the scheduler and monitor as soon as a token is obtained.
    pub auto_start_security: bool,
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_base_url: String::new(),
            client_key: String::new(),
            account_ui_base_url: None,
            custody_mode: None,
            proactive_refresh_enabled: true,
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            transient_retry_secs: DEFAULT_TRANSIENT_RETRY_SECS,
            validation_interval_secs: DEFAULT_VALIDATION_INTERVAL_SECS,
            visibility_validation_enabled: true,
            auto_start_security: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    /// Config with the two required fields set and everything else defaulted.
    #[must_use]
    pub fn new(auth_base_url: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            auth_base_url: auth_base_url.into(),
            client_key: client_key.into(),
            ..Self::default()
        }
    }

    /// Check required fields, URL syntax and non-zero periods.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] for an empty required field and
    /// [`ConfigError::Invalid`] for a malformed URL or a zero interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_base_url.trim().is_empty() {
            return Err(ConfigError::Missing("auth_base_url"));
        }
        if self.client_key.trim().is_empty() {
            return Err(ConfigError::Missing("client_key"));
        }

        parse_base_url("auth_base_url", &self.auth_base_url)?;
        if let Some(account_ui) = &self.account_ui_base_url {
            parse_base_url("account_ui_base_url", account_ui)?;
        }

        if self.validation_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "validation_interval_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.transient_retry_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "transient_retry_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Effective custody mode.
    #[must_use]
    pub fn resolved_custody_mode(&self) -> CustodyMode {
        self.custody_mode.unwrap_or_else(|| CustodyMode::for_base_url(&self.auth_base_url))
    }

    /// Parsed auth base URL.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when the URL does not parse.
    pub fn auth_base(&self) -> Result<Url, ConfigError> {
        parse_base_url("auth_base_url", &self.auth_base_url)
    }

    /// Parsed account UI base URL.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when unset and
    /// [`ConfigError::Invalid`] when the URL does not parse.
    pub fn account_ui_base(&self) -> Result<Url, ConfigError> {
        let raw = self
            .account_ui_base_url
            .as_deref()
            .ok_or(ConfigError::Missing("account_ui_base_url"))?;
        parse_base_url("account_ui_base_url", raw)
    }

    #[must_use]
    pub const fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    #[must_use]
    pub const fn transient_retry(&self) -> Duration {
        Duration::from_secs(self.transient_retry_secs)
    }

    #[must_use]
    pub const fn validation_interval(&self) -> Duration {
        Duration::from_secs(self.validation_interval_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Parse a base URL and normalize it to end with `/` so that relative joins
/// append instead of replacing the last path segment.
fn parse_base_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let with_slash =
        if trimmed.ends_with('/') { trimmed.to_string() } else { format!("{trimmed}/") };
    let url = Url::parse(&with_slash)
        .map_err(|e| ConfigError::Invalid { field, message: e.to_string() })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid { field, message: "URL cannot be a base".to_string() });
    }
    Ok(url)
}
