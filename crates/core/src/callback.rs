//! Redirect callback processing
//!
//! After login the auth backend redirects back with the access token (and,
//! in explicit custody mode, the refresh token) in the query string. The
//! processor consumes those parameters once, stores the tokens and strips
//! them from the visible URL.

use std::sync::Arc;

use parking_lot::Mutex;
use sessionguard_domain::constants::{
    CALLBACK_PARAMS, LOGIN_BOOKKEEPING_KEYS, PARAM_ACCESS_TOKEN, PARAM_ERROR,
    PARAM_ERROR_DESCRIPTION, PARAM_REFRESH_TOKEN,
};
use sessionguard_domain::CallbackError;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::ports::{KeyValueStorage, Location};
use crate::token_store::TokenStore;

/// One-shot latch for callback handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallbackState {
    #[default]
    Idle,
    Processing,
    Processed,
}

impl CallbackState {
    /// Whether a callback has already been claimed.
    #[must_use]
    pub const fn is_latched(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Consumes the token delivered by the login redirect.
pub struct CallbackProcessor {
    store: Arc<TokenStore>,
    location: Arc<dyn Location>,
    session_storage: Arc<dyn KeyValueStorage>,
    state: Mutex<CallbackState>,
}

impl CallbackProcessor {
    #[must_use]
    pub fn new(
        store: Arc<TokenStore>,
        location: Arc<dyn Location>,
        session_storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self { store, location, session_storage, state: Mutex::new(CallbackState::Idle) }
    }

    /// Process the current URL as a login callback.
    ///
    /// A repeated call returns the stored token without touching the URL.
    /// If the latch is set but no token is held, the callback is processed
    /// again.
    ///
    /// # Errors
    /// Returns [`CallbackError::Provider`] when the redirect carries an
    /// error, and [`CallbackError::MissingToken`] when it carries neither a
    /// token nor an error. The latch is released on error.
    #[instrument(skip(self))]
    pub fn handle_callback(&self) -> Result<String, CallbackError> {
        {
            let mut state = self.state.lock();
            if state.is_latched() {
                if let Some(token) = self.store.get_token() {
                    debug!("Callback already handled; returning stored token");
                    return Ok(token);
                }
                debug!("Callback latch set without a token; processing again");
            }
            *state = CallbackState::Processing;
        }

        let outcome = self.process();
        *self.state.lock() = match outcome {
            Ok(_) => CallbackState::Processed,
            Err(_) => CallbackState::Idle,
        };
        outcome
    }

    /// Release the latch. Called when a new login starts and on logout.
    pub fn reset_callback_state(&self) {
        *self.state.lock() = CallbackState::Idle;
    }

    #[must_use]
    pub fn state(&self) -> CallbackState {
        *self.state.lock()
    }

    fn process(&self) -> Result<String, CallbackError> {
        let url = self.location.current_url();
        let param = |name: &str| {
            url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
        };

        if let Some(error) = param(PARAM_ERROR) {
            let description = param(PARAM_ERROR_DESCRIPTION).filter(|d| !d.is_empty());
            warn!(%error, "Login callback carried an error");
            return Err(CallbackError::Provider { error, description });
        }

        let access_token =
            param(PARAM_ACCESS_TOKEN).filter(|t| !t.is_empty()).ok_or(CallbackError::MissingToken)?;

        self.store.set_token(Some(&access_token));
        if let Some(refresh_token) = param(PARAM_REFRESH_TOKEN) {
            self.store.set_refresh_token(&refresh_token);
        }

        self.location.replace_url(&strip_callback_params(&url));
        for key in LOGIN_BOOKKEEPING_KEYS {
            if let Err(e) = self.session_storage.remove(key) {
                warn!(key, error = %e, "Failed to clear login bookkeeping");
            }
        }

        info!("Login callback processed");
        Ok(access_token)
    }
}

impl std::fmt::Debug for CallbackProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackProcessor").field("state", &self.state()).finish_non_exhaustive()
    }
}

/// Copy of `url` without the callback parameters. Other query parameters
/// and the fragment are kept.
#[must_use]
pub fn strip_callback_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !CALLBACK_PARAMS.iter().any(|param| key == param))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut clean = url.clone();
    if kept.is_empty() {
        clean.set_query(None);
    } else {
        clean.query_pairs_mut().clear().extend_pairs(kept);
    }
    clean
}
