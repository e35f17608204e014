//! Server-side session monitoring
//!
//! Two triggers feed one invalidation path:
//! - a periodic validation tick every `validation_interval`
//! - a visibility subscription that re-checks the session when the page
//!   comes back after being hidden
//!
//! Validation errors are inconclusive and never end a session on their own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sessionguard_domain::{InvalidationReason, Visibility};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::invalidation::{SessionInvalidator, SessionTimers};
use crate::ports::{AuthBackend, VisibilitySource};
use crate::refresh::RefreshCoordinator;
use crate::scheduler::sleep_unless_cancelled;
use crate::token_store::TokenStore;

/// Monitor settings taken from the session configuration.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub validation_interval: Duration,
    pub visibility_enabled: bool,
}

/// Periodic and visibility-triggered session validation.
pub struct SessionMonitor {
    settings: MonitorSettings,
    checks: Arc<SessionChecks>,
    timers: SessionTimers,
    visibility: Option<Arc<dyn VisibilitySource>>,
}

impl SessionMonitor {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: MonitorSettings,
        store: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        backend: Arc<dyn AuthBackend>,
        invalidator: Arc<SessionInvalidator>,
        timers: SessionTimers,
        visibility: Option<Arc<dyn VisibilitySource>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let checks = Arc::new(SessionChecks {
            interval: settings.validation_interval,
            store,
            coordinator,
            backend,
            invalidator,
            timers: timers.clone(),
            clock,
            hidden: Mutex::new(HiddenSince::Shown),
        });
        Self { settings, checks, timers, visibility }
    }

    /// Start periodic validation and, when enabled, the visibility watch.
    ///
    /// Restarting replaces both tasks, so the visibility subscription is
    /// never held twice.
    #[instrument(skip(self))]
    pub fn start(&self) {
        self.stop();

        let checks = Arc::clone(&self.checks);
        self.timers.validation.replace(move |cancel| checks.run_periodic(cancel));

        match (&self.visibility, self.settings.visibility_enabled) {
            (Some(source), true) => {
                let receiver = source.subscribe();
                let checks = Arc::clone(&self.checks);
                self.timers
                    .visibility
                    .replace(move |cancel| checks.run_visibility(receiver, cancel));
                info!("Session monitor started with visibility checks");
            }
            _ => info!("Session monitor started"),
        }
    }

    /// Cancel the periodic timer and drop the visibility subscription.
    /// Idempotent, and safe when never started.
    pub fn stop(&self) {
        let validation = self.timers.validation.cancel();
        let visibility = self.timers.visibility.cancel();
        *self.checks.hidden.lock() = HiddenSince::Shown;
        if validation || visibility {
            info!("Session monitor stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timers.validation.is_active()
    }

    #[must_use]
    pub fn is_watching_visibility(&self) -> bool {
        self.timers.visibility.is_active()
    }

    /// Run one periodic validation immediately.
    pub async fn check_now(&self) {
        self.checks.periodic_tick().await;
    }

    /// Invalidate through the shared path.
    pub fn invalidate(&self, reason: InvalidationReason) -> bool {
        self.checks.invalidator.invalidate(reason)
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .field("watching_visibility", &self.is_watching_visibility())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// What the visibility task knows about the current hide.
#[derive(Debug, Clone, Copy)]
enum HiddenSince {
    Shown,
    At(Instant),
    /// Events were dropped, so the hide start is lost.
    Unknown,
}

struct SessionChecks {
    interval: Duration,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    backend: Arc<dyn AuthBackend>,
    invalidator: Arc<SessionInvalidator>,
    timers: SessionTimers,
    clock: Arc<dyn Clock>,
    hidden: Mutex<HiddenSince>,
}

impl SessionChecks {
    async fn run_periodic(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if !sleep_unless_cancelled(&cancel, self.interval).await {
                return;
            }
            if self.periodic_tick().await == Flow::Stop {
                return;
            }
        }
    }

    async fn periodic_tick(&self) -> Flow {
        let Some(mut token) = self.store.get_token() else {
            info!("No access token; stopping session monitor");
            self.timers.validation.cancel();
            self.timers.visibility.cancel();
            return Flow::Stop;
        };

        if self.store.time_until_expiry(&token) <= 0 {
            debug!("Access token expired before validation; refreshing");
            match self.coordinator.refresh_token().await {
                Ok(fresh) => token = fresh,
                Err(e) => {
                    warn!(error = %e, "Refresh before validation failed");
                    self.invalidator.invalidate(InvalidationReason::SessionDeleted);
                    return Flow::Stop;
                }
            }
        }

        match self.backend.validate_session(&token).await {
            Ok(true) => {
                debug!("Session valid");
                Flow::Continue
            }
            Ok(false) => {
                self.invalidator.invalidate(InvalidationReason::SessionDeleted);
                Flow::Stop
            }
            Err(e) => {
                warn!(error = %e, "Session validation inconclusive");
                Flow::Continue
            }
        }
    }

    async fn run_visibility(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<Visibility>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => return,
                event = receiver.recv() => event,
            };

            match event {
                Ok(Visibility::Hidden) => {
                    *self.hidden.lock() = HiddenSince::At(self.clock.now());
                    debug!("Page hidden");
                }
                Ok(Visibility::Visible) => {
                    if self.on_visible().await == Flow::Stop {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Visibility events dropped; revalidating on next show");
                    *self.hidden.lock() = HiddenSince::Unknown;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Visibility source closed");
                    return;
                }
            }
        }
    }

    async fn on_visible(&self) -> Flow {
        let hidden = std::mem::replace(&mut *self.hidden.lock(), HiddenSince::Shown);
        let (hidden_for, hidden_long) = match hidden {
            HiddenSince::Shown => (None, false),
            HiddenSince::At(since) => {
                let elapsed = self.clock.now().saturating_duration_since(since);
                (Some(elapsed), elapsed >= self.interval)
            }
            HiddenSince::Unknown => (None, true),
        };

        let Some(token) = self.store.get_token() else {
            return Flow::Continue;
        };

        if self.store.time_until_expiry(&token) > 0 {
            if !hidden_long {
                return Flow::Continue;
            }
            debug!(hidden_secs = hidden_for.map(|d| d.as_secs()), "Revalidating after long hide");
            return self.validate_after_hide(&token).await;
        }

        debug!("Access token expired while hidden; refreshing");
        match self.coordinator.refresh_token().await {
            Ok(fresh) if hidden_long => self.validate_after_hide(&fresh).await,
            Ok(_) => Flow::Continue,
            Err(e) => {
                warn!(error = %e, "Refresh after hide failed");
                self.invalidator.invalidate(InvalidationReason::SessionDeletedWhileHidden);
                Flow::Stop
            }
        }
    }

    async fn validate_after_hide(&self, token: &str) -> Flow {
        match self.backend.validate_session(token).await {
            Ok(true) => Flow::Continue,
            Ok(false) => {
                self.invalidator.invalidate(InvalidationReason::SessionDeletedWhileHidden);
                Flow::Stop
            }
            Err(e) => {
                warn!(error = %e, "Validation after hide inconclusive; keeping session");
                Flow::Continue
            }
        }
    }
}
