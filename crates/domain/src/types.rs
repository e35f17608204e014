//! Value types exchanged between the session components

use serde::{Deserialize, Serialize};

use crate::impl_wire_name_conversions;

/// Which party holds the refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustodyMode {
    /// Server-set same-site cookie. Script never reads or writes it.
    Cookie,
    /// Client-stored string. Only for insecure-transport development setups.
    Explicit,
}

impl_wire_name_conversions!(CustodyMode {
    Cookie => "cookie",
    Explicit => "explicit",
});

impl CustodyMode {
    /// Pick the custody mode implied by the auth backend's scheme.
    ///
    /// Plain `http://` cannot carry a secure same-site cookie, so it falls
    /// back to explicit storage. Everything else uses the cookie.
    #[must_use]
    pub fn for_base_url(auth_base_url: &str) -> Self {
        if auth_base_url.trim_start().to_ascii_lowercase().starts_with("http://") {
            Self::Explicit
        } else {
            Self::Cookie
        }
    }

    /// Whether script is allowed to hold the refresh token.
    #[must_use]
    pub const fn stores_refresh_token(self) -> bool {
        matches!(self, Self::Explicit)
    }
}

/// Why a session was declared dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    /// The server no longer knows the session.
    SessionDeleted,
    /// The server dropped the session while the tab was hidden.
    SessionDeletedWhileHidden,
    /// The token was already expired and the immediate refresh failed.
    TokenExpired,
    /// The refresh path was rejected by the auth layer.
    RefreshTokenRevoked,
}

impl_wire_name_conversions!(InvalidationReason {
    SessionDeleted => "session_deleted",
    SessionDeletedWhileHidden => "session_deleted_while_hidden",
    TokenExpired => "token_expired",
    RefreshTokenRevoked => "refresh_token_revoked",
});

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl_wire_name_conversions!(Visibility {
    Visible => "visible",
    Hidden => "hidden",
});

/// Body returned by the refresh endpoint.
///
/// Both fields are optional on the wire; a grant without an access token is
/// a failed refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant {
    #[serde(default, alias = "access_token", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Present when the server rotated the refresh token.
    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl RefreshGrant {
    /// Grant carrying only a new access token.
    #[must_use]
    pub fn access(token: impl Into<String>) -> Self {
        Self { access_token: Some(token.into()), refresh_token: None }
    }

    /// Attach a rotated refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}

/// Body sent to the refresh and logout endpoints in explicit custody mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenBody {
    pub refresh_token: String,
}

/// Body returned by the session validation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionValidity {
    pub valid: bool,
}
