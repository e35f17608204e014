//! Proactive token refresh scheduler
//!
//! Runs one timer loop per session: sleep until `refresh_buffer` before the
//! access token expires, refresh, then plan again from the new token.
//! Permanent refresh failures end the session; after a transient one the
//! loop waits a fixed backoff and plans again from whatever token is held
//! by then.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sessionguard_domain::{InvalidationReason, RefreshError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::claims;
use crate::invalidation::SessionInvalidator;
use crate::refresh::RefreshCoordinator;
use crate::timer::TimerSlot;
use crate::token_store::TokenStore;

/// Observable scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// No timer is running.
    Idle,
    /// Waiting for the next refresh (or retry).
    Scheduled,
    /// A refresh is on the wire.
    Firing,
}

/// Scheduler settings taken from the session configuration.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub refresh_buffer: Duration,
    pub transient_retry: Duration,
}

/// Keeps the access token fresh ahead of its expiry.
pub struct ProactiveRefreshScheduler {
    settings: SchedulerSettings,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    invalidator: Arc<SessionInvalidator>,
    timer: Arc<TimerSlot>,
    phase: Arc<Mutex<SchedulerState>>,
}

impl ProactiveRefreshScheduler {
    #[must_use]
    pub fn new(
        settings: SchedulerSettings,
        store: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        invalidator: Arc<SessionInvalidator>,
        timer: Arc<TimerSlot>,
    ) -> Self {
        Self {
            settings,
            store,
            coordinator,
            invalidator,
            timer,
            phase: Arc::new(Mutex::new(SchedulerState::Idle)),
        }
    }

    /// Start (or restart) the refresh loop.
    ///
    /// No-op when proactive refresh is disabled or no token is held. Returns
    /// whether a loop was started.
    #[instrument(skip(self))]
    pub fn start(&self) -> bool {
        if !self.settings.enabled {
            debug!("Proactive refresh disabled");
            return false;
        }
        if !self.store.has_token() {
            debug!("No access token; proactive refresh not started");
            return false;
        }

        let refresh_loop = RefreshLoop {
            settings: self.settings,
            store: Arc::clone(&self.store),
            coordinator: Arc::clone(&self.coordinator),
            invalidator: Arc::clone(&self.invalidator),
            phase: Arc::clone(&self.phase),
        };
        *self.phase.lock() = SchedulerState::Scheduled;
        self.timer.replace(move |cancel| refresh_loop.run(cancel));
        info!("Proactive refresh started");
        true
    }

    /// Cancel the pending timer. A refresh already on the wire completes but
    /// does not reschedule.
    pub fn stop(&self) {
        if self.timer.cancel() {
            info!("Proactive refresh stopped");
        }
        *self.phase.lock() = SchedulerState::Idle;
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.timer.is_active() {
            *self.phase.lock()
        } else {
            SchedulerState::Idle
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.is_active()
    }
}

impl std::fmt::Debug for ProactiveRefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProactiveRefreshScheduler")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

enum Step {
    /// Compute the next delay from the current token.
    Plan { after_refresh: bool },
    /// Refresh now.
    Fire,
}

struct RefreshLoop {
    settings: SchedulerSettings,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    invalidator: Arc<SessionInvalidator>,
    phase: Arc<Mutex<SchedulerState>>,
}

impl RefreshLoop {
    async fn run(self, cancel: CancellationToken) {
        let mut step = Step::Plan { after_refresh: false };

        loop {
            if cancel.is_cancelled() {
                return;
            }

            step = match step {
                Step::Plan { after_refresh } => {
                    let Some(token) = self.store.get_token() else {
                        debug!("No access token; proactive refresh idle");
                        self.set_phase(SchedulerState::Idle);
                        return;
                    };
                    let ttl = self.store.time_until_expiry(&token);

                    if ttl <= 0 && !after_refresh {
                        info!(ttl, "Access token already expired; refreshing immediately");
                        self.set_phase(SchedulerState::Firing);
                        match self.coordinator.refresh_token().await {
                            Ok(_) => Step::Plan { after_refresh: true },
                            Err(e) => {
                                warn!(error = %e, "Immediate refresh of expired token failed");
                                self.invalidator.invalidate(InvalidationReason::TokenExpired);
                                return;
                            }
                        }
                    } else {
                        let mut delay = refresh_delay(ttl, self.settings.refresh_buffer);
                        if after_refresh && delay.is_zero() {
                            warn!(ttl, "Refreshed token is inside the refresh buffer");
                            delay = self.settings.transient_retry;
                        }
                        debug!(
                            delay_secs = delay.as_secs(),
                            expires_at = ?claims::expires_at(&token),
                            "Scheduled proactive refresh"
                        );
                        self.set_phase(SchedulerState::Scheduled);
                        if !sleep_unless_cancelled(&cancel, delay).await {
                            return;
                        }
                        Step::Fire
                    }
                }
                Step::Fire => {
                    self.set_phase(SchedulerState::Firing);
                    let outcome = self.coordinator.refresh_token().await;
                    if cancel.is_cancelled() {
                        debug!("Scheduler stopped during refresh; not rescheduling");
                        return;
                    }
                    match outcome {
                        Ok(_) => Step::Plan { after_refresh: true },
                        Err(e) => {
                            if !self.handle_failure(&e, &cancel).await {
                                return;
                            }
                            Step::Plan { after_refresh: false }
                        }
                    }
                }
            };
        }
    }

    /// Returns `true` when the loop should plan again.
    async fn handle_failure(&self, error: &RefreshError, cancel: &CancellationToken) -> bool {
        if error.is_permanent() {
            warn!(error = %error, "Refresh rejected by auth layer");
            self.invalidator.invalidate(InvalidationReason::RefreshTokenRevoked);
            return false;
        }

        warn!(
            error = %error,
            retry_secs = self.settings.transient_retry.as_secs(),
            "Transient refresh failure; replanning after backoff"
        );
        self.set_phase(SchedulerState::Scheduled);
        sleep_unless_cancelled(cancel, self.settings.transient_retry).await
    }

    fn set_phase(&self, phase: SchedulerState) {
        *self.phase.lock() = phase;
    }
}

/// `max(0, ttl - buffer)` as a duration.
fn refresh_delay(ttl_secs: i64, buffer: Duration) -> Duration {
    let buffer_secs = i64::try_from(buffer.as_secs()).unwrap_or(i64::MAX);
    u64::try_from(ttl_secs.saturating_sub(buffer_secs)).map_or(Duration::ZERO, Duration::from_secs)
}

/// Returns `false` if cancelled before the delay elapsed.
pub(crate) async fn sleep_unless_cancelled(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
