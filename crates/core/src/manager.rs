//! Session manager
//!
//! Owns one token store, refresh coordinator, scheduler, monitor and
//! callback processor, all wired to the same host ports. Expect one manager
//! per application origin; separate managers do not share refresh state.

use std::sync::Arc;

use sessionguard_domain::constants::{
    LOGIN_BOOKKEEPING_KEYS, LOGIN_ORIGIN_APP_KEY, LOGIN_RETURN_URL_KEY,
};
use sessionguard_domain::{
    CallbackError, CustodyMode, InvalidationReason, RefreshError, SessionConfig, SessionResult,
};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::callback::{CallbackProcessor, CallbackState};
use crate::clock::{Clock, SystemClock};
use crate::invalidation::{SessionInvalidCallback, SessionInvalidator, SessionTimers};
use crate::listeners::ListenerId;
use crate::login::{build_login_url, LoginRequest};
use crate::monitor::{MonitorSettings, SessionMonitor};
use crate::ports::{AuthBackend, KeyValueStorage, Location, VisibilitySource};
use crate::refresh::RefreshCoordinator;
use crate::scheduler::{ProactiveRefreshScheduler, SchedulerSettings, SchedulerState};
use crate::token_store::{TokenListener, TokenStore};

/// Host-provided adapters.
#[derive(Clone)]
pub struct SessionPorts {
    /// Persistent storage for tokens.
    pub storage: Arc<dyn KeyValueStorage>,
    /// Session-scoped storage for login bookkeeping.
    pub session_storage: Arc<dyn KeyValueStorage>,
    pub backend: Arc<dyn AuthBackend>,
    pub location: Arc<dyn Location>,
    pub visibility: Option<Arc<dyn VisibilitySource>>,
    pub clock: Arc<dyn Clock>,
}

impl SessionPorts {
    /// Ports with the system clock and no visibility source.
    #[must_use]
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        session_storage: Arc<dyn KeyValueStorage>,
        backend: Arc<dyn AuthBackend>,
        location: Arc<dyn Location>,
    ) -> Self {
        Self {
            storage,
            session_storage,
            backend,
            location,
            visibility: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Arc<dyn VisibilitySource>) -> Self {
        self.visibility = Some(visibility);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Entry point for hosts: owns every session component.
pub struct SessionManager {
    config: SessionConfig,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    invalidator: Arc<SessionInvalidator>,
    scheduler: ProactiveRefreshScheduler,
    monitor: SessionMonitor,
    callback: CallbackProcessor,
    backend: Arc<dyn AuthBackend>,
    session_storage: Arc<dyn KeyValueStorage>,
}

impl SessionManager {
    /// Build a manager from validated configuration and host ports.
    ///
    /// # Errors
    /// Returns a configuration error if `config` fails validation.
    pub fn new(config: SessionConfig, ports: SessionPorts) -> SessionResult<Self> {
        config.validate()?;
        let custody = config.resolved_custody_mode();
        info!(client = %config.client_key, %custody, "Creating session manager");

        let store = Arc::new(TokenStore::new(ports.storage, custody, Arc::clone(&ports.clock)));
        let coordinator =
            Arc::new(RefreshCoordinator::new(Arc::clone(&store), Arc::clone(&ports.backend)));
        let timers = SessionTimers::new();
        let invalidator = Arc::new(SessionInvalidator::new(Arc::clone(&store), timers.clone()));

        let scheduler = ProactiveRefreshScheduler::new(
            SchedulerSettings {
                enabled: config.proactive_refresh_enabled,
                refresh_buffer: config.refresh_buffer(),
                transient_retry: config.transient_retry(),
            },
            Arc::clone(&store),
            Arc::clone(&coordinator),
            Arc::clone(&invalidator),
            Arc::clone(&timers.refresh),
        );
        let monitor = SessionMonitor::new(
            MonitorSettings {
                validation_interval: config.validation_interval(),
                visibility_enabled: config.visibility_validation_enabled,
            },
            Arc::clone(&store),
            Arc::clone(&coordinator),
            Arc::clone(&ports.backend),
            Arc::clone(&invalidator),
            timers,
            ports.visibility,
            ports.clock,
        );
        let callback = CallbackProcessor::new(
            Arc::clone(&store),
            ports.location,
            Arc::clone(&ports.session_storage),
        );

        Ok(Self {
            config,
            store,
            coordinator,
            invalidator,
            scheduler,
            monitor,
            callback,
            backend: ports.backend,
            session_storage: ports.session_storage,
        })
    }

    /// Load a persisted token and, if configured, start session security.
    ///
    /// Returns whether a token was found.
    #[instrument(skip(self))]
    pub fn bootstrap(&self) -> bool {
        let found = self.store.get_token().is_some();
        if found && self.config.auto_start_security {
            self.start_session_security();
        }
        debug!(found, "Bootstrap complete");
        found
    }

    /// Start proactive refresh and session monitoring together. Opens a new
    /// invalidation episode.
    pub fn start_session_security(&self) {
        self.invalidator.begin_episode();
        self.scheduler.start();
        self.monitor.start();
    }

    /// Stop proactive refresh and session monitoring. Idempotent.
    pub fn stop_session_security(&self) {
        self.scheduler.stop();
        self.monitor.stop();
    }

    #[must_use]
    pub fn is_security_active(&self) -> bool {
        self.scheduler.is_running() || self.monitor.is_running()
    }

    /// Consume the login redirect, then start session security if
    /// configured.
    ///
    /// When security is already running and the redirect delivered a
    /// different token, proactive refresh is re-planned from the new token.
    ///
    /// # Errors
    /// Returns the [`CallbackError`] from the processor.
    pub fn handle_callback(&self) -> Result<String, CallbackError> {
        let previous = self.store.get_token();
        let token = self.callback.handle_callback()?;
        if !self.config.auto_start_security {
            return Ok(token);
        }

        if !self.is_security_active() {
            self.start_session_security();
        } else if previous.as_deref() != Some(token.as_str()) {
            debug!("Callback replaced the access token; re-planning proactive refresh");
            self.scheduler.start();
        }
        Ok(token)
    }

    /// Prepare a login: reset the callback latch, record bookkeeping in
    /// session storage and return the URL to navigate to.
    ///
    /// # Errors
    /// Returns a login-parameter or configuration error when the URL cannot
    /// be built.
    pub fn begin_login(&self, request: &LoginRequest) -> SessionResult<Url> {
        let url = build_login_url(&self.config, request)?;
        self.callback.reset_callback_state();

        let bookkeeping = [
            (LOGIN_ORIGIN_APP_KEY, request.origin_app.as_deref()),
            (LOGIN_RETURN_URL_KEY, request.return_url.as_deref()),
        ];
        for (key, value) in bookkeeping {
            let result = match value {
                Some(value) => self.session_storage.set(key, value),
                None => self.session_storage.remove(key),
            };
            if let Err(e) = result {
                warn!(key, error = %e, "Failed to record login bookkeeping");
            }
        }

        info!(mode = %request.mode, "Login started");
        Ok(url)
    }

    /// End the session locally and, best-effort, on the server.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.stop_session_security();

        let access_token = self.store.get_token();
        let refresh_token = self.store.get_refresh_token();
        if let Err(e) =
            self.backend.logout(access_token.as_deref(), refresh_token.as_deref()).await
        {
            warn!(error = %e, "Backend logout failed; clearing local session anyway");
        }

        self.store.clear_token();
        for key in LOGIN_BOOKKEEPING_KEYS {
            if let Err(e) = self.session_storage.remove(key) {
                warn!(key, error = %e, "Failed to clear login bookkeeping");
            }
        }
        self.callback.reset_callback_state();
        info!("Logged out");
    }

    /// Refresh now, sharing any refresh already in flight.
    ///
    /// # Errors
    /// Returns the [`RefreshError`] from the coordinator.
    pub async fn refresh_token(&self) -> Result<String, RefreshError> {
        self.coordinator.refresh_token().await
    }

    /// Run one session validation now, outside the periodic schedule.
    pub async fn validate_now(&self) {
        self.monitor.check_now().await;
    }

    /// End the session with `reason`, as the monitor would.
    pub fn invalidate(&self, reason: InvalidationReason) -> bool {
        self.invalidator.invalidate(reason)
    }

    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        self.store.get_token()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.has_token()
    }

    pub fn add_token_listener(&self, listener: Arc<TokenListener>) -> ListenerId {
        self.store.add_token_listener(listener)
    }

    pub fn remove_token_listener(&self, id: ListenerId) -> bool {
        self.store.remove_token_listener(id)
    }

    pub fn add_session_invalid_callback(
        &self,
        callback: Arc<SessionInvalidCallback>,
    ) -> ListenerId {
        self.invalidator.add_callback(callback)
    }

    pub fn remove_session_invalid_callback(&self, id: ListenerId) -> bool {
        self.invalidator.remove_callback(id)
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn custody_mode(&self) -> CustodyMode {
        self.store.custody_mode()
    }

    #[must_use]
    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    #[must_use]
    pub fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    #[must_use]
    pub fn callback_state(&self) -> CallbackState {
        self.callback.state()
    }

    #[must_use]
    pub const fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_session_security();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("client", &self.config.client_key)
            .field("store", &self.store)
            .field("scheduler", &self.scheduler)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use sessionguard_domain::{ConfigError, SessionError};

    use super::*;
    use crate::ports::MemoryStorage;
    use crate::testing::{MockAuthBackend, MockLocation};

    fn ports() -> SessionPorts {
        SessionPorts::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            Arc::new(MockAuthBackend::new()),
            Arc::new(MockLocation::new("https://app.example.com/")),
        )
    }

    #[test]
    fn test_new_validates_config() {
        let config = SessionConfig::new("https://auth.example.com", "");
        let result = SessionManager::new(config, ports());
        assert!(matches!(result, Err(SessionError::Config(ConfigError::Missing("client_key")))));
    }

    #[test]
    fn test_custody_follows_base_url() {
        let manager =
            SessionManager::new(SessionConfig::new("http://localhost:8080", "portal"), ports())
                .unwrap();
        assert_eq!(manager.custody_mode(), CustodyMode::Explicit);

        let manager =
            SessionManager::new(SessionConfig::new("https://auth.example.com", "portal"), ports())
                .unwrap();
        assert_eq!(manager.custody_mode(), CustodyMode::Cookie);
    }

    #[tokio::test]
    async fn test_bootstrap_without_token() {
        let manager =
            SessionManager::new(SessionConfig::new("https://auth.example.com", "portal"), ports())
                .unwrap();
        assert!(!manager.bootstrap());
        assert!(!manager.is_security_active());
    }
}
