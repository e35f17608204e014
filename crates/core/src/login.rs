//! Login kick-off URLs
//!
//! Two flows lead to the same redirect callback:
//! - direct: `{auth_base}/login/{client_key}?redirect_uri=...`
//! - centralized: `{account_ui_base}/login?client=...&redirect_uri=...`

use serde::{Deserialize, Serialize};
use sessionguard_domain::constants::LOGIN_PATH;
use sessionguard_domain::{
    impl_wire_name_conversions, LoginParameterError, SessionConfig, SessionResult,
};
use url::Url;

/// Which login page the user is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMode {
    /// The auth backend's own login page for this client.
    #[default]
    Direct,
    /// The shared account UI, which routes back to this client.
    Centralized,
}

impl_wire_name_conversions!(LoginMode {
    Direct => "direct",
    Centralized => "centralized",
});

/// Parameters for starting a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub mode: LoginMode,
    /// Where the auth backend redirects after login.
    pub redirect_uri: String,
    /// Identifier of the app that started the login.
    #[serde(default)]
    pub origin_app: Option<String>,
    /// In-app location to restore after the callback.
    #[serde(default)]
    pub return_url: Option<String>,
}

impl LoginRequest {
    #[must_use]
    pub fn direct(redirect_uri: impl Into<String>) -> Self {
        Self {
            mode: LoginMode::Direct,
            redirect_uri: redirect_uri.into(),
            origin_app: None,
            return_url: None,
        }
    }

    #[must_use]
    pub fn centralized(redirect_uri: impl Into<String>) -> Self {
        Self { mode: LoginMode::Centralized, ..Self::direct(redirect_uri) }
    }

    #[must_use]
    pub fn with_origin_app(mut self, origin_app: impl Into<String>) -> Self {
        self.origin_app = Some(origin_app.into());
        self
    }

    #[must_use]
    pub fn with_return_url(mut self, return_url: impl Into<String>) -> Self {
        self.return_url = Some(return_url.into());
        self
    }
}

/// Build the login URL for `request`.
///
/// # Errors
/// Returns [`LoginParameterError`] for a missing client key or redirect
/// target, and a configuration error when centralized login is requested
/// without an account UI base URL.
pub fn build_login_url(config: &SessionConfig, request: &LoginRequest) -> SessionResult<Url> {
    let client_key = config.client_key.trim();
    if client_key.is_empty() {
        return Err(LoginParameterError::MissingClient.into());
    }
    let redirect_uri = request.redirect_uri.trim();
    if redirect_uri.is_empty() {
        return Err(LoginParameterError::MissingRedirect.into());
    }
    Url::parse(redirect_uri).map_err(|e| LoginParameterError::InvalidUrl(e.to_string()))?;

    let mut url = match request.mode {
        LoginMode::Direct => {
            let mut url = config.auth_base()?;
            push_segments(&mut url, &[LOGIN_PATH, client_key])?;
            url
        }
        LoginMode::Centralized => {
            let mut url = config.account_ui_base()?;
            push_segments(&mut url, &[LOGIN_PATH])?;
            url.query_pairs_mut().append_pair("client", client_key);
            url
        }
    };
    url.query_pairs_mut().append_pair("redirect_uri", redirect_uri);
    Ok(url)
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<(), LoginParameterError> {
    let mut path = url
        .path_segments_mut()
        .map_err(|()| LoginParameterError::InvalidUrl(non_hierarchical_message(segments)))?;
    path.pop_if_empty().extend(segments);
    Ok(())
}

fn non_hierarchical_message(segments: &[&str]) -> String {
    format!("cannot append {} to a non-hierarchical URL", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use sessionguard_domain::{ConfigError, SessionError};

    use super::*;

    fn config() -> SessionConfig {
        let mut config = SessionConfig::new("https://auth.example.com/auth", "portal");
        config.account_ui_base_url = Some("https://account.example.com".into());
        config
    }

    #[test]
    fn test_direct_login_url() {
        let url = build_login_url(&config(), &LoginRequest::direct("https://app.example.com/cb"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://auth.example.com/auth/login/portal?redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb"
        );
    }

    #[test]
    fn test_centralized_login_url() {
        let url =
            build_login_url(&config(), &LoginRequest::centralized("https://app.example.com/cb"))
                .unwrap();
        assert_eq!(url.path(), "/login");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client".to_string(), "portal".to_string()),
                ("redirect_uri".to_string(), "https://app.example.com/cb".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_parameters() {
        let mut no_client = config();
        no_client.client_key = String::new();
        assert_eq!(
            build_login_url(&no_client, &LoginRequest::direct("https://app.example.com/cb")),
            Err(SessionError::LoginParameter(LoginParameterError::MissingClient))
        );

        assert_eq!(
            build_login_url(&config(), &LoginRequest::direct("  ")),
            Err(SessionError::LoginParameter(LoginParameterError::MissingRedirect))
        );

        assert!(matches!(
            build_login_url(&config(), &LoginRequest::direct("/relative")),
            Err(SessionError::LoginParameter(LoginParameterError::InvalidUrl(_)))
        ));
    }

    #[test]
    fn test_centralized_requires_account_ui() {
        let config = SessionConfig::new("https://auth.example.com", "portal");
        assert_eq!(
            build_login_url(&config, &LoginRequest::centralized("https://app.example.com/cb")),
            Err(SessionError::Config(ConfigError::Missing("account_ui_base_url")))
        );
    }

    #[test]
    fn test_login_mode_parsing() {
        assert_eq!("Centralized".parse::<LoginMode>(), Ok(LoginMode::Centralized));
        let request: LoginRequest =
            serde_json::from_str(r#"{"redirect_uri":"https://app.example.com/cb"}"#).unwrap();
        assert_eq!(request.mode, LoginMode::Direct);
    }
}
