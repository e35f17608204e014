//! reqwest implementation of the [`AuthBackend`] port.
//!
//! Endpoints, relative to the auth base URL:
//! - `POST refresh/{client_key}`
//! - `GET account/validate-session`
//! - `POST logout/{client_key}`

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use sessionguard_core::AuthBackend;
use sessionguard_domain::constants::{LOGOUT_PATH, REFRESH_PATH, VALIDATE_SESSION_PATH};
use sessionguard_domain::{
    ConfigError, RefreshError, RefreshGrant, RefreshTokenBody, SessionConfig, SessionError,
    SessionValidity, ValidationError,
};
use tracing::{debug, instrument, warn};
use url::Url;

use super::client::HttpClient;
use crate::errors::TransportError;

/// Auth backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: HttpClient,
    refresh_url: Url,
    validate_url: Url,
    logout_url: Url,
}

impl HttpAuthBackend {
    /// Backend with a client built from the configured request timeout.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an invalid base URL or if the HTTP client
    /// cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
        let client = HttpClient::builder().timeout(config.request_timeout()).build()?;
        Self::with_client(config, client)
    }

    /// Backend using an existing client.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an invalid base URL.
    pub fn with_client(config: &SessionConfig, client: HttpClient) -> Result<Self, ConfigError> {
        let base = config.auth_base()?;
        let client_key = config.client_key.trim();
        Ok(Self {
            client,
            refresh_url: endpoint(&base, REFRESH_PATH, Some(client_key))?,
            validate_url: endpoint(&base, VALIDATE_SESSION_PATH, None)?,
            logout_url: endpoint(&base, LOGOUT_PATH, Some(client_key))?,
        })
    }

    pub const fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    pub const fn validate_url(&self) -> &Url {
        &self.validate_url
    }

    pub const fn logout_url(&self) -> &Url {
        &self.logout_url
    }

    fn with_refresh_body(request: RequestBuilder, refresh_token: Option<&str>) -> RequestBuilder {
        match refresh_token {
            Some(token) => request.json(&RefreshTokenBody { refresh_token: token.to_owned() }),
            None => request,
        }
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshGrant, RefreshError> {
        let request = Self::with_refresh_body(
            self.client.request(Method::POST, self.refresh_url.clone()),
            refresh_token,
        );
        let response = self.client.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            warn!(status = status.as_u16(), %message, "Refresh rejected");
            return Err(RefreshError::Status { status: status.as_u16(), message });
        }

        let grant: RefreshGrant = read_json(response).await.map_err(|e| match e {
            BodyError::Transport(e) => RefreshError::from(e),
            BodyError::Malformed(message) => RefreshError::MalformedResponse(message),
        })?;
        if grant.access_token.as_deref().map_or(true, str::is_empty) {
            return Err(RefreshError::MissingAccessToken);
        }

        debug!(rotated = grant.refresh_token.is_some(), "Refresh succeeded");
        Ok(grant)
    }

    #[instrument(skip_all)]
    async fn validate_session(&self, access_token: &str) -> Result<bool, ValidationError> {
        let request =
            self.client.request(Method::GET, self.validate_url.clone()).bearer_auth(access_token);
        let response = self.client.send(request).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            debug!("Session rejected with 401");
            return Ok(false);
        }
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(ValidationError::Status { status: status.as_u16(), message });
        }

        let validity: SessionValidity = read_json(response).await.map_err(|e| match e {
            BodyError::Transport(e) => ValidationError::from(e),
            BodyError::Malformed(message) => ValidationError::MalformedResponse(message),
        })?;
        Ok(validity.valid)
    }

    #[instrument(skip_all)]
    async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), SessionError> {
        let mut request = self.client.request(Method::POST, self.logout_url.clone());
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        let response = self.client.send(Self::with_refresh_body(request, refresh_token)).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = error_message(response).await;
        Err(SessionError::Logout(format!("status {}: {message}", status.as_u16())))
    }
}

fn endpoint(base: &Url, path: &str, client_key: Option<&str>) -> Result<Url, ConfigError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ConfigError::Invalid {
            field: "auth_base_url",
            message: "cannot be used as a base URL".to_string(),
        })?
        .pop_if_empty()
        .extend(path.split('/'))
        .extend(client_key);
    Ok(url)
}

enum BodyError {
    Transport(TransportError),
    Malformed(String),
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BodyError> {
    let body = response.text().await.map_err(|e| BodyError::Transport(e.into()))?;
    serde_json::from_str(&body).map_err(|e| BodyError::Malformed(e.to_string()))
}

/// Best-effort message from an error response: a `message`, `error` or
/// `error_description` field when the body is JSON, the raw text otherwise,
/// and the status reason when the body is empty.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let from_json = serde_json::from_str::<serde_json::Value>(&body).ok().and_then(|value| {
        ["message", "error_description", "error"]
            .iter()
            .find_map(|field| value.get(field).and_then(|v| v.as_str()).map(str::to_owned))
    });

    from_json
        .or_else(|| Some(body.trim().to_owned()).filter(|text| !text.is_empty()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned())
}
