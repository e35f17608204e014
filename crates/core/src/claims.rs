//! Unverified access-token claim reading
//!
//! The client never checks the signature. It only reads `exp` from the
//! payload segment to plan refreshes. A token whose `exp` cannot be read is
//! treated as already expired.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sessionguard_domain::constants::UNDECODABLE_TOKEN_TTL_SECS;

/// Read the `exp` claim (seconds since epoch) from a JWT-shaped token.
///
/// Padding on the payload segment is tolerated. Float `exp` values are
/// truncated toward negative infinity.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn expiry_seconds(token: &str) -> Option<i64> {
    let payload_segment = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload_segment.trim_end_matches('=')).ok()?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = payload.get("exp")?;

    exp.as_i64().or_else(|| exp.as_f64().filter(|v| v.is_finite()).map(|v| v.floor() as i64))
}

/// Expiry as a UTC timestamp, for logging.
#[must_use]
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    expiry_seconds(token).and_then(|exp| DateTime::from_timestamp(exp, 0))
}

/// Seconds until `token` expires, relative to `now_unix_seconds`.
///
/// Negative once expired. An undecodable token reports
/// [`UNDECODABLE_TOKEN_TTL_SECS`].
#[must_use]
pub fn time_until_expiry(token: &str, now_unix_seconds: i64) -> i64 {
    expiry_seconds(token)
        .map_or(UNDECODABLE_TOKEN_TTL_SECS, |exp| exp.saturating_sub(now_unix_seconds))
}

/// Whether `token` expires within `within_seconds` of now.
///
/// Already-expired and undecodable tokens count as expiring soon.
#[must_use]
pub fn will_expire_soon(token: &str, within_seconds: i64, now_unix_seconds: i64) -> bool {
    time_until_expiry(token, now_unix_seconds) <= within_seconds
}
