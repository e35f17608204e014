//! Port interfaces supplied by the host
//!
//! Core logic reaches storage, the auth backend, the page location and
//! visibility events only through these traits. Infra provides the
//! production adapters; [`MemoryStorage`] and [`VisibilityChannel`] are
//! small in-process implementations usable by any host.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use sessionguard_domain::{
    RefreshError, RefreshGrant, SessionError, StorageError, ValidationError, Visibility,
};
use tokio::sync::broadcast;
use url::Url;

/// String key-value storage (persistent or session scoped).
pub trait KeyValueStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key succeeds.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Network calls to the auth backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange the refresh credential for a new access token.
    ///
    /// `refresh_token` is only supplied in explicit custody mode; in cookie
    /// mode the transport carries the credential.
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshGrant, RefreshError>;

    /// Ask the server whether the session behind `access_token` still exists.
    ///
    /// A 401 is `Ok(false)`, not an error.
    async fn validate_session(&self, access_token: &str) -> Result<bool, ValidationError>;

    /// End the server-side session.
    async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), SessionError>;
}

/// The page URL, as seen by the redirect callback.
pub trait Location: Send + Sync {
    fn current_url(&self) -> Url;

    /// Replace the visible URL without navigating or adding a history entry.
    fn replace_url(&self, url: &Url);
}

/// Source of page visibility changes.
pub trait VisibilitySource: Send + Sync {
    /// Start a new subscription. Dropping the receiver ends it.
    fn subscribe(&self) -> broadcast::Receiver<Visibility>;
}

/// In-memory [`KeyValueStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

const VISIBILITY_CHANNEL_CAPACITY: usize = 16;

/// Broadcast-backed [`VisibilitySource`]. The host calls
/// [`VisibilityChannel::publish`] from its visibility hook.
#[derive(Debug, Clone)]
pub struct VisibilityChannel {
    sender: broadcast::Sender<Visibility>,
}

impl Default for VisibilityChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityChannel {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(VISIBILITY_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Deliver a visibility change. Returns how many subscribers received it.
    pub fn publish(&self, visibility: Visibility) -> usize {
        self.sender.send(visibility).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl VisibilitySource for VisibilityChannel {
    fn subscribe(&self) -> broadcast::Receiver<Visibility> {
        self.sender.subscribe()
    }
}
