//! # SessionGuard Core
//!
//! Session-security logic, independent of any transport or host platform.
//!
//! This crate contains:
//! - Port interfaces for storage, the auth backend, the page location,
//!   visibility events and wall time
//! - The token store with change notification
//! - The single-flight refresh coordinator
//! - The proactive refresh scheduler and the session monitor
//! - Redirect callback processing and login URL building
//! - [`SessionManager`], which owns one instance of each of the above
//!
//! ## Architecture Principles
//! - Only depends on `sessionguard-domain`
//! - No HTTP or filesystem code; hosts supply adapters through the ports
//! - All timers run on the ambient tokio runtime

pub mod callback;
pub mod claims;
pub mod clock;
pub mod invalidation;
pub mod listeners;
pub mod login;
pub mod manager;
pub mod monitor;
pub mod ports;
pub mod refresh;
pub mod scheduler;
pub mod timer;
pub mod token_store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use callback::{CallbackProcessor, CallbackState};
pub use clock::{Clock, SystemClock};
pub use invalidation::{
    session_invalid_callback, SessionInvalidCallback, SessionInvalidator, SessionTimers,
};
pub use listeners::{ListenerId, ListenerRegistry};
pub use login::{build_login_url, LoginMode, LoginRequest};
pub use manager::{SessionManager, SessionPorts};
pub use monitor::{MonitorSettings, SessionMonitor};
pub use ports::{
    AuthBackend, KeyValueStorage, Location, MemoryStorage, VisibilityChannel, VisibilitySource,
};
pub use refresh::RefreshCoordinator;
pub use scheduler::{ProactiveRefreshScheduler, SchedulerSettings, SchedulerState};
pub use timer::TimerSlot;
pub use token_store::{token_listener, TokenListener, TokenStore};
