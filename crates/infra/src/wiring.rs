//! Default port wiring for native hosts.

use std::path::PathBuf;
use std::sync::Arc;

use sessionguard_core::{Location, MemoryStorage, SessionPorts};
use sessionguard_domain::{SessionConfig, SessionResult};

use crate::http::HttpAuthBackend;
use crate::storage::FileStorage;

/// Ports backed by HTTP, a token file and process-lifetime session storage.
///
/// The host still supplies the [`Location`] and, if it has one, a visibility
/// source via [`SessionPorts::with_visibility`].
///
/// # Errors
/// Returns a configuration error for an invalid auth base URL and a storage
/// error if the token file exists but cannot be read.
pub fn production_ports(
    config: &SessionConfig,
    token_file: impl Into<PathBuf>,
    location: Arc<dyn Location>,
) -> SessionResult<SessionPorts> {
    let backend = HttpAuthBackend::new(config)?;
    let storage = FileStorage::open(token_file)?;
    Ok(SessionPorts::new(
        Arc::new(storage),
        Arc::new(MemoryStorage::new()),
        Arc::new(backend),
        location,
    ))
}
