//! Access-token store with change notification
//!
//! Holds the current access token in memory, mirrors it to persistent
//! storage and notifies listeners with `(new, previous)` whenever the value
//! actually changes. The refresh token lives here too, subject to the
//! configured custody mode.

use std::sync::Arc;

use parking_lot::RwLock;
use sessionguard_domain::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use sessionguard_domain::CustodyMode;
use tracing::{debug, info, warn};

use crate::claims;
use crate::clock::Clock;
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::ports::KeyValueStorage;

/// Token-change listener: `(new_token, previous_token)`.
pub type TokenListener = dyn Fn(Option<&str>, Option<&str>) + Send + Sync;

/// Wrap a closure as a shareable [`TokenListener`].
pub fn token_listener<F>(listener: F) -> Arc<TokenListener>
where
    F: Fn(Option<&str>, Option<&str>) + Send + Sync + 'static,
{
    Arc::new(listener)
}

/// In-memory access token backed by persistent storage.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
    custody: CustodyMode,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<String>>,
    listeners: ListenerRegistry<TokenListener>,
}

impl TokenStore {
    #[must_use]
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        custody: CustodyMode,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            custody,
            clock,
            current: RwLock::new(None),
            listeners: ListenerRegistry::new("token"),
        }
    }

    #[must_use]
    pub const fn custody_mode(&self) -> CustodyMode {
        self.custody
    }

    /// Replace the access token.
    ///
    /// `None` or an empty string clears it. Persistent storage follows the
    /// new value. Listeners run after the in-memory value is updated, and
    /// only if it changed. Storage failures are logged.
    pub fn set_token(&self, token: Option<&str>) {
        let next = token.filter(|t| !t.is_empty()).map(str::to_string);

        let previous = {
            let mut current = self.current.write();
            if *current == next {
                return;
            }
            std::mem::replace(&mut *current, next.clone())
        };

        match &next {
            Some(value) => self.persist(ACCESS_TOKEN_KEY, value),
            None => self.erase(ACCESS_TOKEN_KEY),
        }

        debug!(had_token = previous.is_some(), has_token = next.is_some(), "Access token changed");
        self.notify(next.as_deref(), previous.as_deref());
    }

    /// Current access token, hydrating from persistent storage on first use.
    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        if let Some(token) = self.current.read().clone() {
            return Some(token);
        }

        let stored = match self.storage.get(ACCESS_TOKEN_KEY) {
            Ok(value) => value.filter(|t| !t.is_empty())?,
            Err(e) => {
                warn!(error = %e, "Failed to read access token from storage");
                return None;
            }
        };

        let mut current = self.current.write();
        Some(current.get_or_insert(stored).clone())
    }

    /// Whether a token is held in memory or storage.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.get_token().is_some()
    }

    /// Drop the access and refresh tokens.
    ///
    /// Storage is always cleared. Listeners fire with `(None, previous)` only
    /// if an in-memory token was held.
    pub fn clear_token(&self) {
        let previous = self.current.write().take();

        self.erase(ACCESS_TOKEN_KEY);
        self.clear_refresh_token();

        if let Some(previous) = previous {
            info!("Access token cleared");
            self.notify(None, Some(&previous));
        }
    }

    /// Store a refresh token. Only explicit custody keeps it.
    pub fn set_refresh_token(&self, token: &str) {
        match self.custody {
            CustodyMode::Explicit if !token.is_empty() => self.persist(REFRESH_TOKEN_KEY, token),
            CustodyMode::Explicit => self.erase(REFRESH_TOKEN_KEY),
            CustodyMode::Cookie => {
                debug!("Ignoring refresh token in cookie custody mode");
                self.erase(REFRESH_TOKEN_KEY);
            }
        }
    }

    /// Stored refresh token. Always `None` in cookie custody mode.
    #[must_use]
    pub fn get_refresh_token(&self) -> Option<String> {
        if !self.custody.stores_refresh_token() {
            return None;
        }
        match self.storage.get(REFRESH_TOKEN_KEY) {
            Ok(value) => value.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token from storage");
                None
            }
        }
    }

    pub fn clear_refresh_token(&self) {
        self.erase(REFRESH_TOKEN_KEY);
    }

    /// Seconds until `token` expires according to the store's clock.
    #[must_use]
    pub fn time_until_expiry(&self, token: &str) -> i64 {
        claims::time_until_expiry(token, self.clock.unix_seconds())
    }

    #[must_use]
    pub fn will_expire_soon(&self, token: &str, within_seconds: i64) -> bool {
        claims::will_expire_soon(token, within_seconds, self.clock.unix_seconds())
    }

    pub fn add_token_listener(&self, listener: Arc<TokenListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_token_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn notify(&self, next: Option<&str>, previous: Option<&str>) {
        self.listeners.notify(|listener| listener(next, previous));
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!(key, error = %e, "Failed to persist token");
        }
    }

    fn erase(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!(key, error = %e, "Failed to clear token from storage");
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("custody", &self.custody)
            .field("has_token", &self.current.read().is_some())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
