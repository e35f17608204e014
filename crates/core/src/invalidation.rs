//! Shared session invalidation path
//!
//! The scheduler and the monitor both end a dead session the same way: stop
//! every session timer, clear the tokens and tell the session-invalid
//! callbacks why. Callbacks fire at most once per episode; an episode opens
//! each time session security is started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sessionguard_domain::InvalidationReason;
use tracing::{debug, warn};

use crate::listeners::{ListenerId, ListenerRegistry};
use crate::timer::TimerSlot;
use crate::token_store::TokenStore;

/// Session-invalid callback.
pub type SessionInvalidCallback = dyn Fn(InvalidationReason) + Send + Sync;

/// Wrap a closure as a shareable [`SessionInvalidCallback`].
pub fn session_invalid_callback<F>(callback: F) -> Arc<SessionInvalidCallback>
where
    F: Fn(InvalidationReason) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Timer slots the invalidator stops.
#[derive(Debug, Clone)]
pub struct SessionTimers {
    pub refresh: Arc<TimerSlot>,
    pub validation: Arc<TimerSlot>,
    pub visibility: Arc<TimerSlot>,
}

impl SessionTimers {
    #[must_use]
    pub fn new() -> Self {
        Self {
            refresh: Arc::new(TimerSlot::new("proactive-refresh")),
            validation: Arc::new(TimerSlot::new("session-validation")),
            visibility: Arc::new(TimerSlot::new("visibility")),
        }
    }

    /// Cancel every session timer.
    pub fn cancel_all(&self) {
        self.refresh.cancel();
        self.validation.cancel();
        self.visibility.cancel();
    }
}

impl Default for SessionTimers {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends sessions and notifies session-invalid callbacks.
pub struct SessionInvalidator {
    store: Arc<TokenStore>,
    timers: SessionTimers,
    callbacks: ListenerRegistry<SessionInvalidCallback>,
    invalidated: AtomicBool,
}

impl SessionInvalidator {
    #[must_use]
    pub fn new(store: Arc<TokenStore>, timers: SessionTimers) -> Self {
        Self {
            store,
            timers,
            callbacks: ListenerRegistry::new("session-invalid"),
            invalidated: AtomicBool::new(false),
        }
    }

    /// Open a new invalidation episode.
    pub fn begin_episode(&self) {
        self.invalidated.store(false, Ordering::SeqCst);
    }

    /// Whether the current episode already ended in invalidation.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// Invalidate the session.
    ///
    /// Stops the refresh, validation and visibility tasks, clears both
    /// tokens and notifies callbacks. Only the first call per episode has an
    /// effect; it returns `true`.
    pub fn invalidate(&self, reason: InvalidationReason) -> bool {
        if self.invalidated.swap(true, Ordering::SeqCst) {
            debug!(%reason, "Session already invalidated in this episode");
            return false;
        }

        warn!(%reason, "Session invalidated");
        self.timers.cancel_all();
        self.store.clear_token();
        self.callbacks.notify(|callback| callback(reason));
        true
    }

    pub fn add_callback(&self, callback: Arc<SessionInvalidCallback>) -> ListenerId {
        self.callbacks.add(callback)
    }

    pub fn remove_callback(&self, id: ListenerId) -> bool {
        self.callbacks.remove(id)
    }

    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }
}

impl std::fmt::Debug for SessionInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInvalidator")
            .field("invalidated", &self.is_invalidated())
            .field("callbacks", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}
