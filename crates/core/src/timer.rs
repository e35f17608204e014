//! Single cancellable background task slot
//!
//! A [`TimerSlot`] owns at most one running task. Installing a new task
//! cancels the previous one. Cancellation goes through a
//! [`CancellationToken`] rather than `JoinHandle::abort`, so a task may
//! cancel its own slot (for example while invalidating the session) and
//! still finish the synchronous work it is doing.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct ActiveTask {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Slot holding one cancellable task at a time.
pub struct TimerSlot {
    name: &'static str,
    next_generation: AtomicU64,
    active: Mutex<Option<ActiveTask>>,
}

impl TimerSlot {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, next_generation: AtomicU64::new(1), active: Mutex::new(None) }
    }

    /// Cancel the current task (if any) and spawn a new one.
    ///
    /// `make_task` receives the new task's token. The task is also dropped
    /// at its next suspension point once the token is cancelled. Returns the
    /// generation number of the new task.
    pub fn replace<F, Fut>(&self, make_task: F) -> u64
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let task = make_task(cancel.clone());
        let guard = cancel.clone();

        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            debug!(slot = self.name, generation = previous.generation, "Replacing timer task");
            previous.cancel.cancel();
        }

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = guard.cancelled() => {}
                () = task => {}
            }
        });
        *active = Some(ActiveTask { generation, cancel, handle });
        generation
    }

    /// Cancel the current task. Idempotent. Returns whether a task was live.
    pub fn cancel(&self) -> bool {
        let Some(previous) = self.active.lock().take() else {
            return false;
        };
        let was_live = !previous.handle.is_finished() && !previous.cancel.is_cancelled();
        previous.cancel.cancel();
        if was_live {
            debug!(slot = self.name, generation = previous.generation, "Cancelled timer task");
        }
        was_live
    }

    /// Whether a task is installed, not cancelled and still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|task| !task.cancel.is_cancelled() && !task.handle.is_finished())
    }

    /// Generation of the installed task, live or not.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        self.active.lock().as_ref().map(|task| task.generation)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(task) = self.active.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for TimerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSlot")
            .field("name", &self.name)
            .field("generation", &self.generation())
            .field("active", &self.is_active())
            .finish()
    }
}
