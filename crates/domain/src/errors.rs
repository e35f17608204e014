//! Error types used throughout SessionGuard
//!
//! One enum per failure family. [`SessionError`] wraps them all for callers
//! that do not care which component failed.

use thiserror::Error;

use crate::constants::AUTH_REJECTION_MARKERS;

/// Missing or invalid setup. Fatal, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Login kick-off was asked to build a URL without enough information.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginParameterError {
    #[error("Login requires a client identifier")]
    MissingClient,

    #[error("Login requires a redirect target")]
    MissingRedirect,

    #[error("Invalid login URL: {0}")]
    InvalidUrl(String),
}

/// The redirect callback could not produce an access token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Login failed: {}", format_provider_error(.error, .description))]
    Provider { error: String, description: Option<String> },

    #[error("Callback carried neither an access token nor an error")]
    MissingToken,

    #[error("Invalid callback URL: {0}")]
    InvalidUrl(String),
}

fn format_provider_error(error: &str, description: &Option<String>) -> String {
    match description.as_deref() {
        Some(desc) if !desc.is_empty() => format!("{error}: {desc}"),
        _ => error.to_string(),
    }
}

/// Refresh call failure.
///
/// `Clone` because every caller waiting on a shared in-flight refresh
/// receives its own copy of the outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh request failed: {0}")]
    Network(String),

    #[error("Refresh rejected with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed refresh response: {0}")]
    MalformedResponse(String),

    #[error("Refresh response did not include an access token")]
    MissingAccessToken,

    #[error("Refresh failed: {0}")]
    Backend(String),

    #[error("Refresh task aborted: {0}")]
    Aborted(String),
}

impl RefreshError {
    /// Whether the failure is an auth-layer rejection that no retry will fix.
    ///
    /// 401/403 responses are always permanent. Any other message is matched
    /// case-insensitively against [`AUTH_REJECTION_MARKERS`], whichever
    /// variant carries it; everything else is transient.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Status { status, message } => {
                matches!(status, 401 | 403) || contains_auth_rejection(message)
            }
            Self::Network(message)
            | Self::MalformedResponse(message)
            | Self::Backend(message)
            | Self::Aborted(message) => contains_auth_rejection(message),
            Self::MissingAccessToken => false,
        }
    }
}

/// Case-insensitive match against the known auth-rejection fragments.
#[must_use]
pub fn contains_auth_rejection(message: &str) -> bool {
    let lowered = message.to_lowercase();
    AUTH_REJECTION_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Session validation failure. A 401 is not an error, it is `Ok(false)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Validation request failed: {0}")]
    Network(String),

    #[error("Validation returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed validation response: {0}")]
    MalformedResponse(String),
}

/// Persistent or session-scoped storage failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Storage serialization error: {0}")]
    Serialization(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Main error type for SessionGuard
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    LoginParameter(#[from] LoginParameterError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Logout request failed: {0}")]
    Logout(String),
}

/// Result type alias for SessionGuard operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_401_is_permanent() {
        let err = RefreshError::Status { status: 401, message: String::new() };
        assert!(err.is_permanent());
        let err = RefreshError::Status { status: 403, message: "nope".into() };
        assert!(err.is_permanent());
    }

    #[test]
    fn test_status_message_markers_are_case_insensitive() {
        let err = RefreshError::Status { status: 400, message: "Refresh Token REVOKED".into() };
        assert!(err.is_permanent());

        let err = RefreshError::Backend("token Expired".into());
        assert!(err.is_permanent());

        let err = RefreshError::Backend("Invalid grant".into());
        assert!(err.is_permanent());
    }

    #[test]
    fn test_transient_failures() {
        assert!(!RefreshError::Network("connection reset".into()).is_permanent());
        assert!(!RefreshError::Status { status: 503, message: "try later".into() }.is_permanent());
        assert!(!RefreshError::MalformedResponse("EOF while parsing".into()).is_permanent());
        assert!(!RefreshError::MissingAccessToken.is_permanent());
        assert!(!RefreshError::Aborted("runtime shutdown".into()).is_permanent());
    }

    /// Validates that rejection markers are honoured in every message.
    ///
    /// Assertions:
    /// - Transport and parse errors mentioning a marker are permanent.
    /// - The same variants without a marker stay transient.
    #[test]
    fn test_markers_apply_to_every_message() {
        assert!(RefreshError::Network("session EXPIRED upstream".into()).is_permanent());
        assert!(RefreshError::MalformedResponse("invalid type: null".into()).is_permanent());
        assert!(RefreshError::Aborted("unauthorized".into()).is_permanent());
        assert!(!RefreshError::Network("dns lookup failed".into()).is_permanent());
    }

    #[test]
    fn test_callback_error_display() {
        let err = CallbackError::Provider {
            error: "access_denied".into(),
            description: Some("User cancelled".into()),
        };
        assert_eq!(err.to_string(), "Login failed: access_denied: User cancelled");

        let err = CallbackError::Provider { error: "access_denied".into(), description: None };
        assert_eq!(err.to_string(), "Login failed: access_denied");
    }

    #[test]
    fn test_session_error_wraps_components() {
        let err: SessionError = ConfigError::Missing("client_key").into();
        assert!(matches!(err, SessionError::Config(ConfigError::Missing("client_key"))));
        assert_eq!(err.to_string(), "Missing required configuration: client_key");
    }
}
