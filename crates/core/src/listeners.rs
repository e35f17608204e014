//! Listener registry with per-listener panic isolation
//!
//! Token-change listeners and session-invalid callbacks share this registry.
//! Membership is a set keyed by `Arc` identity. Notification runs over a
//! snapshot, so listeners may add or remove listeners while being notified
//! and no registry lock is held while user code runs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

/// Handle returned by [`ListenerRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw numeric id, for logging.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Set of shared listeners of type `T` (usually a `dyn Fn`).
pub struct ListenerRegistry<T: ?Sized> {
    label: &'static str,
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Arc<T>)>>,
}

impl<T: ?Sized> ListenerRegistry<T> {
    /// Create an empty registry. `label` names it in panic logs.
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self { label, next_id: AtomicU64::new(1), entries: Mutex::new(Vec::new()) }
    }

    /// Register a listener.
    ///
    /// Registering the same `Arc` again returns the id it already has.
    pub fn add(&self, listener: Arc<T>) -> ListenerId {
        let mut entries = self.entries.lock();
        if let Some((id, _)) = entries.iter().find(|(_, existing)| Arc::ptr_eq(existing, &listener))
        {
            return *id;
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push((id, listener));
        id
    }

    /// Unregister a listener. Returns `false` if the id was unknown.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Current listeners, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.lock().iter().map(|(_, listener)| Arc::clone(listener)).collect()
    }

    /// Invoke `call` once per listener.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    /// Returns the number of listeners that panicked.
    pub fn notify(&self, mut call: impl FnMut(&T)) -> usize {
        let mut failures = 0;
        for listener in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| call(&listener))).is_err() {
                failures += 1;
                error!(registry = self.label, "Listener panicked during notification");
            }
        }
        failures
    }
}

impl<T: ?Sized> std::fmt::Debug for ListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("label", &self.label)
            .field("len", &self.len())
            .finish()
    }
}
