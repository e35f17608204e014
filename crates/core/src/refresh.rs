//! Single-flight access-token refresh
//!
//! Concurrent callers share one network refresh. The first caller spawns
//! the refresh on its own task and records the shared result future under a
//! short synchronous lock; every later caller clones that future until it
//! settles. Because the network call lives on its own task, a caller that is
//! dropped mid-await does not cancel the refresh, and its outcome still
//! reaches the token store. A refresh that panics or is aborted clears the
//! tokens like any other failure.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use sessionguard_domain::RefreshError;
use tracing::{debug, error, info, instrument};

use crate::ports::AuthBackend;
use crate::token_store::TokenStore;

type PendingRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

enum RefreshState {
    Idle,
    Refreshing { generation: u64, pending: PendingRefresh },
}

/// Resets the state to `Idle` when the refresh task ends, however it ends.
struct InFlightRelease {
    state: Arc<Mutex<RefreshState>>,
    generation: u64,
}

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let owned = matches!(
            &*state,
            RefreshState::Refreshing { generation, .. } if *generation == self.generation
        );
        if owned {
            *state = RefreshState::Idle;
        }
    }
}

/// Performs token refreshes, at most one at a time.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    backend: Arc<dyn AuthBackend>,
    state: Arc<Mutex<RefreshState>>,
    next_generation: AtomicU64,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(store: Arc<TokenStore>, backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            store,
            backend,
            state: Arc::new(Mutex::new(RefreshState::Idle)),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Refresh the access token, or join the refresh already in flight.
    ///
    /// On success the token store holds the new token (and a rotated refresh
    /// token in explicit custody mode). On failure both tokens are cleared
    /// and every waiter receives the same error.
    ///
    /// # Errors
    /// Returns the [`RefreshError`] reported by the backend, or
    /// [`RefreshError::MissingAccessToken`] when the grant has no token.
    #[instrument(skip(self))]
    pub async fn refresh_token(&self) -> Result<String, RefreshError> {
        self.join_or_start().await
    }

    /// Whether a refresh is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    fn join_or_start(&self) -> PendingRefresh {
        let mut state = self.state.lock();
        if let RefreshState::Refreshing { generation, pending } = &*state {
            debug!(generation, "Joining in-flight refresh");
            return pending.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let release = InFlightRelease { state: Arc::clone(&self.state), generation };
        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);

        debug!(generation, "Starting refresh");
        let task_store = Arc::clone(&store);
        let task = tokio::spawn(async move {
            let _release = release;
            let refresh = perform_refresh(&task_store, backend.as_ref());
            let outcome = AssertUnwindSafe(refresh).catch_unwind().await;
            outcome.unwrap_or_else(|_| {
                error!("Token refresh panicked");
                task_store.clear_token();
                Err(RefreshError::Aborted("refresh panicked".to_string()))
            })
        });

        let pending: PendingRefresh = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Token refresh task aborted");
                    store.clear_token();
                    Err(RefreshError::Aborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        *state = RefreshState::Refreshing { generation, pending: pending.clone() };
        pending
    }
}

async fn perform_refresh(
    store: &TokenStore,
    backend: &dyn AuthBackend,
) -> Result<String, RefreshError> {
    let refresh_token = store.get_refresh_token();

    let outcome = backend.refresh(refresh_token.as_deref()).await.and_then(|grant| {
        let access = grant
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(RefreshError::MissingAccessToken)?;
        Ok((access, grant.refresh_token))
    });

    match outcome {
        Ok((access, rotated)) => {
            if let Some(rotated) = rotated {
                store.set_refresh_token(&rotated);
            }
            store.set_token(Some(&access));
            info!("Access token refreshed");
            Ok(access)
        }
        Err(e) => {
            error!(error = %e, permanent = e.is_permanent(), "Token refresh failed");
            store.clear_token();
            Err(e)
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}
