//! Conversions from transport errors into the domain error families.

use reqwest::Error as HttpError;
use sessionguard_domain::{RefreshError, SessionError, ValidationError};

/// Transport failure, described once and converted into whichever domain
/// error the calling operation reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        let description = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else if err.is_decode() {
            format!("failed to read response body: {err}")
        } else {
            err.to_string()
        };
        Self(description)
    }
}

impl From<TransportError> for RefreshError {
    fn from(value: TransportError) -> Self {
        Self::Network(value.0)
    }
}

impl From<TransportError> for ValidationError {
    fn from(value: TransportError) -> Self {
        Self::Network(value.0)
    }
}

impl From<TransportError> for SessionError {
    fn from(value: TransportError) -> Self {
        Self::Logout(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_maps_to_network_variants() {
        let err = TransportError("connection failed: refused".into());
        assert_eq!(
            RefreshError::from(err.clone()),
            RefreshError::Network("connection failed: refused".into())
        );
        assert_eq!(
            ValidationError::from(err.clone()),
            ValidationError::Network("connection failed: refused".into())
        );
        assert_eq!(
            SessionError::from(err),
            SessionError::Logout("connection failed: refused".into())
        );
        assert!(!RefreshError::Network("connection failed: refused".into()).is_permanent());
    }
}
