//! Test doubles for the host ports
//!
//! Available to this crate's tests and, through the `test-utils` feature, to
//! downstream crates.

// Allow missing error/panic docs for test mocks - they are designed to be simple
// and errors are clearly indicated by their return types
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sessionguard_domain::{RefreshError, RefreshGrant, SessionError, ValidationError};
use url::Url;

pub use crate::ports::{MemoryStorage, VisibilityChannel};
use crate::clock::Clock;
use crate::ports::{AuthBackend, Location};

const MOCK_EPOCH_SECS: u64 = 1_700_000_000;

/// Clock that follows tokio time plus a manual offset.
///
/// Under `start_paused` tests, sleeping and auto-advance move this clock the
/// same way they move tokio timers; [`MockClock::advance`] jumps wall time
/// without firing any timer, as a suspended machine would.
#[derive(Debug, Clone)]
pub struct MockClock {
    tokio_start: tokio::time::Instant,
    base_system_time: SystemTime,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            tokio_start: tokio::time::Instant::now(),
            base_system_time: UNIX_EPOCH + Duration::from_secs(MOCK_EPOCH_SECS),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move both monotonic and wall time forward by `by`.
    pub fn advance(&self, by: Duration) {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        *self.offset.lock().unwrap() += by;
    }

    fn elapsed(&self) -> Duration {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let offset = *self.offset.lock().unwrap();
        self.tokio_start.elapsed() + offset
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.tokio_start.into_std() + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}

/// Unsigned JWT-shaped token whose payload carries only `exp`.
pub fn token_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

#[derive(Debug, Default)]
struct BackendScript {
    refresh: VecDeque<Result<RefreshGrant, RefreshError>>,
    validation: VecDeque<Result<bool, ValidationError>>,
    logout: VecDeque<Result<(), SessionError>>,
    refresh_tokens_seen: Vec<Option<String>>,
    validated_tokens: Vec<String>,
    logouts: Vec<(Option<String>, Option<String>)>,
}

/// Scripted [`AuthBackend`].
///
/// Responses are consumed in order. An unscripted refresh fails with a
/// network error, an unscripted validation reports a live session and an
/// unscripted logout succeeds.
#[derive(Debug, Clone, Default)]
pub struct MockAuthBackend {
    script: Arc<Mutex<BackendScript>>,
    delay: Option<Duration>,
}

impl MockAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every refresh by `delay` (tokio time).
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_refresh(&self, response: Result<RefreshGrant, RefreshError>) {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.script.lock().unwrap().refresh.push_back(response);
    }

    pub fn push_validation(&self, response: Result<bool, ValidationError>) {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.script.lock().unwrap().validation.push_back(response);
    }

    pub fn push_logout(&self, response: Result<(), SessionError>) {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.script.lock().unwrap().logout.push_back(response);
    }

    pub fn refresh_calls(&self) -> usize {
        self.script.lock().unwrap().refresh_tokens_seen.len()
    }

    pub fn validate_calls(&self) -> usize {
        self.script.lock().unwrap().validated_tokens.len()
    }

    pub fn logout_calls(&self) -> usize {
        self.script.lock().unwrap().logouts.len()
    }

    /// Refresh tokens passed to each refresh call, in order.
    pub fn refresh_tokens_seen(&self) -> Vec<Option<String>> {
        self.script.lock().unwrap().refresh_tokens_seen.clone()
    }

    /// Access tokens passed to each validation call, in order.
    pub fn validated_tokens(&self) -> Vec<String> {
        self.script.lock().unwrap().validated_tokens.clone()
    }

    /// `(access_token, refresh_token)` for each logout call.
    pub fn logouts(&self) -> Vec<(Option<String>, Option<String>)> {
        self.script.lock().unwrap().logouts.clone()
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshGrant, RefreshError> {
        let response = {
            // SAFETY: Mutex poisoning is acceptable in test mocks
            let mut script = self.script.lock().unwrap();
            script.refresh_tokens_seen.push(refresh_token.map(str::to_owned));
            script
                .refresh
                .pop_front()
                .unwrap_or_else(|| Err(RefreshError::Network("no scripted refresh".into())))
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn validate_session(&self, access_token: &str) -> Result<bool, ValidationError> {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let mut script = self.script.lock().unwrap();
        script.validated_tokens.push(access_token.to_owned());
        script.validation.pop_front().unwrap_or(Ok(true))
    }

    async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), SessionError> {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        let mut script = self.script.lock().unwrap();
        script.logouts.push((access_token.map(str::to_owned), refresh_token.map(str::to_owned)));
        script.logout.pop_front().unwrap_or(Ok(()))
    }
}

/// In-memory page location.
#[derive(Debug)]
pub struct MockLocation {
    url: Mutex<Url>,
    replacements: Mutex<usize>,
}

impl MockLocation {
    pub fn new(url: &str) -> Self {
        Self { url: Mutex::new(Url::parse(url).unwrap()), replacements: Mutex::new(0) }
    }

    /// Simulate a navigation.
    pub fn set_url(&self, url: &str) {
        *self.url.lock().unwrap() = Url::parse(url).unwrap();
    }

    /// Number of [`Location::replace_url`] calls.
    pub fn replace_count(&self) -> usize {
        *self.replacements.lock().unwrap()
    }
}

impl Location for MockLocation {
    fn current_url(&self) -> Url {
        // SAFETY: Mutex poisoning is acceptable in test mocks
        self.url.lock().unwrap().clone()
    }

    fn replace_url(&self, url: &Url) {
        *self.url.lock().unwrap() = url.clone();
        *self.replacements.lock().unwrap() += 1;
    }
}
