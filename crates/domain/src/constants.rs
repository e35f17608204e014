//! Session constants
//!
//! Storage keys, callback query parameters, backend path suffixes and timing
//! defaults shared by the core and infra crates.

// Persistent storage keys
pub const ACCESS_TOKEN_KEY: &str = "sessionguard.access_token";
pub const REFRESH_TOKEN_KEY: &str = "sessionguard.refresh_token";

// Session-scoped login bookkeeping
pub const LOGIN_ORIGIN_APP_KEY: &str = "sessionguard.login.origin_app";
pub const LOGIN_RETURN_URL_KEY: &str = "sessionguard.login.return_url";
pub const LOGIN_BOOKKEEPING_KEYS: [&str; 2] = [LOGIN_ORIGIN_APP_KEY, LOGIN_RETURN_URL_KEY];

// Redirect callback query parameters
pub const PARAM_ACCESS_TOKEN: &str = "access_token";
pub const PARAM_REFRESH_TOKEN: &str = "refresh_token";
pub const PARAM_ERROR: &str = "error";
pub const PARAM_ERROR_DESCRIPTION: &str = "error_description";
pub const PARAM_STATE: &str = "state";
pub const CALLBACK_PARAMS: [&str; 5] =
    [PARAM_ACCESS_TOKEN, PARAM_REFRESH_TOKEN, PARAM_ERROR, PARAM_ERROR_DESCRIPTION, PARAM_STATE];

// Backend path segments (appended to the auth base URL)
pub const LOGIN_PATH: &str = "login";
pub const LOGOUT_PATH: &str = "logout";
pub const REFRESH_PATH: &str = "refresh";
pub const VALIDATE_SESSION_PATH: &str = "account/validate-session";

// Timing defaults (seconds)
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 60;
pub const DEFAULT_TRANSIENT_RETRY_SECS: u64 = 30;
pub const DEFAULT_VALIDATION_INTERVAL_SECS: u64 = 30 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Seconds reported for a token whose `exp` claim cannot be read.
pub const UNDECODABLE_TOKEN_TTL_SECS: i64 = -1;

/// Lowercase fragments that mark a refresh failure as an auth-layer
/// rejection rather than a transient fault.
pub const AUTH_REJECTION_MARKERS: [&str; 4] = ["unauthorized", "expired", "revoked", "invalid"];
