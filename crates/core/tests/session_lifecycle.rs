//! Integration tests for the session manager lifecycle
//!
//! Drives a [`SessionManager`] through its public API with scripted ports and
//! paused tokio time: bootstrap, callback, proactive refresh, server-side
//! invalidation, hide/show revalidation and logout.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sessionguard_core::testing::{token_expiring_at, MockAuthBackend, MockClock, MockLocation};
use sessionguard_core::{
    session_invalid_callback, token_listener, CallbackState, Clock, KeyValueStorage, Location, LoginRequest,
    MemoryStorage, SchedulerState, SessionManager, SessionPorts, VisibilityChannel,
};
use sessionguard_domain::constants::{
    ACCESS_TOKEN_KEY, LOGIN_ORIGIN_APP_KEY, LOGIN_RETURN_URL_KEY, REFRESH_TOKEN_KEY,
};
use sessionguard_domain::{InvalidationReason, RefreshGrant, SessionConfig, Visibility};

const VALIDATION_INTERVAL: Duration = Duration::from_secs(1800);

struct Fixture {
    clock: MockClock,
    backend: Arc<MockAuthBackend>,
    storage: Arc<MemoryStorage>,
    session_storage: Arc<MemoryStorage>,
    location: Arc<MockLocation>,
    visibility: VisibilityChannel,
    invalidations: Arc<Mutex<Vec<InvalidationReason>>>,
    manager: SessionManager,
}

impl Fixture {
    fn token_in(&self, secs: i64) -> String {
        token_expiring_at(self.clock.unix_seconds() + secs)
    }
}

fn fixture(auth_base_url: &str, page_url: &str) -> Fixture {
    let clock = MockClock::new();
    let backend = Arc::new(MockAuthBackend::new());
    let storage = Arc::new(MemoryStorage::new());
    let session_storage = Arc::new(MemoryStorage::new());
    let location = Arc::new(MockLocation::new(page_url));
    let visibility = VisibilityChannel::new();

    let ports = SessionPorts::new(
        storage.clone(),
        session_storage.clone(),
        backend.clone(),
        location.clone(),
    )
    .with_visibility(Arc::new(visibility.clone()))
    .with_clock(Arc::new(clock.clone()));

    let manager = SessionManager::new(SessionConfig::new(auth_base_url, "portal"), ports)
        .expect("valid configuration");

    let invalidations = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&invalidations);
    manager.add_session_invalid_callback(session_invalid_callback(move |reason| {
        sink.lock().unwrap().push(reason);
    }));

    Fixture {
        clock,
        backend,
        storage,
        session_storage,
        location,
        visibility,
        invalidations,
        manager,
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Validates bootstrap from persisted storage followed by a proactive
/// refresh.
///
/// Assertions:
/// - A persisted token is picked up and security starts automatically.
/// - The refresh fires one buffer before expiry and notifies listeners.
#[tokio::test(start_paused = true)]
async fn test_bootstrap_then_proactive_refresh() {
    let f = fixture("https://auth.example.com", "https://app.example.com/");
    let initial = f.token_in(3600);
    f.storage.set(ACCESS_TOKEN_KEY, &initial).unwrap();

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    f.manager.add_token_listener(token_listener(move |new, prev| {
        sink.lock().unwrap().push((new.map(str::to_owned), prev.map(str::to_owned)));
    }));

    assert!(f.manager.bootstrap());
    assert!(f.manager.is_security_active());
    assert_eq!(f.manager.scheduler_state(), SchedulerState::Scheduled);

    let fresh = f.token_in(7200);
    f.backend.push_refresh(Ok(RefreshGrant::access(fresh.clone())));

    tokio::time::sleep(Duration::from_secs(3539)).await;
    assert_eq!(f.backend.refresh_calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(f.backend.refresh_calls(), 1);
    assert_eq!(f.manager.get_token(), Some(fresh.clone()));
    assert_eq!(*changes.lock().unwrap(), vec![(Some(fresh), Some(initial))]);
    assert_eq!(f.backend.validate_calls(), 1);
    assert!(f.invalidations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_without_token_stays_idle() {
    let f = fixture("https://auth.example.com", "https://app.example.com/");

    assert!(!f.manager.bootstrap());
    assert!(!f.manager.is_security_active());
    assert_eq!(f.manager.scheduler_state(), SchedulerState::Idle);
}

/// Validates a login callback that arrives while security is running.
///
/// Assertions:
/// - Security stays active.
/// - Proactive refresh is re-planned from the delivered token, not the one
///   held at bootstrap.
#[tokio::test(start_paused = true)]
async fn test_callback_while_active_replans_refresh() {
    let f = fixture("https://auth.example.com", "https://app.example.com/");
    f.storage.set(ACCESS_TOKEN_KEY, &f.token_in(3600)).unwrap();
    assert!(f.manager.bootstrap());

    tokio::time::sleep(Duration::from_secs(100)).await;
    f.manager.begin_login(&LoginRequest::direct("https://app.example.com/callback")).unwrap();
    let delivered = f.token_in(600);
    f.location.set_url(&format!("https://app.example.com/callback?access_token={delivered}"));
    assert_eq!(f.manager.handle_callback().unwrap(), delivered);
    assert!(f.manager.is_security_active());

    f.backend.push_refresh(Ok(RefreshGrant::access(f.token_in(7200))));

    // Delivered at 100s with a 600s lifetime and a 60s buffer: due at 640s.
    tokio::time::sleep(Duration::from_secs(539)).await;
    assert_eq!(f.backend.refresh_calls(), 0);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(f.backend.refresh_calls(), 1);
    assert_eq!(f.manager.scheduler_state(), SchedulerState::Scheduled);
    assert!(f.invalidations.lock().unwrap().is_empty());
}

/// Validates the redirect callback through the manager.
///
/// Assertions:
/// - The token is stored and the URL cleaned.
/// - Session security starts automatically.
/// - Explicit custody keeps the refresh token from the redirect.
#[tokio::test(start_paused = true)]
async fn test_callback_starts_security() {
    let f = fixture("http://localhost:8080", "http://localhost:3000/home?tab=1");
    let token = f.token_in(3600);
    let callback_url =
        format!("http://localhost:3000/home?tab=1&access_token={token}&refresh_token=r1");
    f.location.set_url(&callback_url);

    assert_eq!(f.manager.handle_callback().as_deref(), Ok(token.as_str()));

    assert!(f.manager.is_security_active());
    assert!(f.manager.monitor().is_watching_visibility());
    assert_eq!(f.manager.callback_state(), CallbackState::Processed);
    assert_eq!(f.location.current_url().as_str(), "http://localhost:3000/home?tab=1");
    assert_eq!(f.storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
}

/// Validates server-side invalidation across two episodes.
///
/// Assertions:
/// - A negative validation ends the session once with `SessionDeleted`.
/// - All timers stop and the token is cleared.
/// - A new login opens a new episode that can be invalidated again.
#[tokio::test(start_paused = true)]
async fn test_server_side_invalidation_once_per_episode() {
    let f = fixture("https://auth.example.com", "https://app.example.com/");
    let token = f.token_in(100_000);
    f.location.set_url(&format!("https://app.example.com/?access_token={token}"));
    f.manager.handle_callback().unwrap();

    f.backend.push_validation(Ok(false));
    tokio::time::sleep(VALIDATION_INTERVAL + Duration::from_secs(1)).await;

    assert_eq!(*f.invalidations.lock().unwrap(), vec![InvalidationReason::SessionDeleted]);
    assert!(!f.manager.is_authenticated());
    assert!(!f.manager.is_security_active());
    assert!(!f.manager.monitor().is_watching_visibility());
    assert_eq!(f.storage.get(ACCESS_TOKEN_KEY).unwrap(), None);

    assert!(!f.manager.invalidate(InvalidationReason::TokenExpired));
    assert_eq!(f.invalidations.lock().unwrap().len(), 1);

    let token = f.token_in(100_000);
    f.location.set_url(&format!("https://app.example.com/?access_token={token}"));
    f.manager.handle_callback().unwrap();
    assert!(f.manager.is_security_active());

    f.backend.push_validation(Ok(false));
    tokio::time::sleep(VALIDATION_INTERVAL + Duration::from_secs(1)).await;

    assert_eq!(f.invalidations.lock().unwrap().len(), 2);
}

/// Validates revalidation when the page returns after a long hide.
///
/// Assertions:
/// - No validation happens while hidden.
/// - Coming back after a full interval validates once.
/// - A negative answer ends the session with `SessionDeletedWhileHidden`.
#[tokio::test(start_paused = true)]
async fn test_long_hide_revalidates_on_visible() {
    let f = fixture("https://auth.example.com", "https://app.example.com/");
    let token = f.token_in(100_000);
    f.location.set_url(&format!("https://app.example.com/?access_token={token}"));
    f.manager.handle_callback().unwrap();
    settle().await;
    assert_eq!(f.visibility.subscriber_count(), 1);

    f.visibility.publish(Visibility::Hidden);
    settle().await;
    f.clock.advance(VALIDATION_INTERVAL);

    f.backend.push_validation(Ok(false));
    f.visibility.publish(Visibility::Visible);
    settle().await;

    assert_eq!(f.backend.validated_tokens(), vec![token]);
    assert_eq!(
        *f.invalidations.lock().unwrap(),
        vec![InvalidationReason::SessionDeletedWhileHidden]
    );
    assert!(!f.manager.is_authenticated());
    settle().await;
    assert_eq!(f.visibility.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_short_hide_does_not_validate() {
    let f = fixture("https://auth.example.com", "https://app.example.com/");
    let token = f.token_in(100_000);
    f.location.set_url(&format!("https://app.example.com/?access_token={token}"));
    f.manager.handle_callback().unwrap();
    settle().await;

    f.visibility.publish(Visibility::Hidden);
    settle().await;
    f.clock.advance(Duration::from_secs(60));
    f.visibility.publish(Visibility::Visible);
    settle().await;

    assert_eq!(f.backend.validate_calls(), 0);
    assert!(f.manager.is_authenticated());
}

/// Validates login bookkeeping and logout cleanup.
///
/// Assertions:
/// - `begin_login` records origin app and return URL.
/// - Logout sends both credentials in explicit custody mode.
/// - Logout clears tokens, bookkeeping and the callback latch.
#[tokio::test(start_paused = true)]
async fn test_login_then_logout_clears_everything() {
    let f = fixture("http://localhost:8080", "http://localhost:3000/");

    let url = f
        .manager
        .begin_login(
            &LoginRequest::direct("http://localhost:3000/callback")
                .with_origin_app("portal")
                .with_return_url("/reports"),
        )
        .unwrap();
    assert!(url.as_str().starts_with("http://localhost:8080/login/portal?redirect_uri="));
    assert_eq!(f.session_storage.get(LOGIN_ORIGIN_APP_KEY).unwrap().as_deref(), Some("portal"));
    assert_eq!(f.session_storage.get(LOGIN_RETURN_URL_KEY).unwrap().as_deref(), Some("/reports"));

    let token = f.token_in(3600);
    f.location
        .set_url(&format!("http://localhost:3000/callback?access_token={token}&refresh_token=r1"));
    f.manager.handle_callback().unwrap();
    assert!(f.session_storage.is_empty());

    f.session_storage.set(LOGIN_RETURN_URL_KEY, "/stale").unwrap();
    f.manager.logout().await;

    assert_eq!(f.backend.logouts(), vec![(Some(token), Some("r1".to_string()))]);
    assert!(!f.manager.is_authenticated());
    assert!(!f.manager.is_security_active());
    assert!(f.storage.is_empty());
    assert!(f.session_storage.is_empty());
    assert_eq!(f.manager.callback_state(), CallbackState::Idle);
    assert!(f.invalidations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_logout_survives_backend_failure() {
    let f = fixture("https://auth.example.com", "https://app.example.com/");
    f.storage.set(ACCESS_TOKEN_KEY, &f.token_in(3600)).unwrap();
    f.manager.bootstrap();

    f.backend.push_logout(Err(sessionguard_domain::SessionError::Logout("503".into())));
    f.manager.logout().await;

    assert_eq!(f.backend.logout_calls(), 1);
    assert!(!f.manager.is_authenticated());
    assert!(f.storage.is_empty());
}
