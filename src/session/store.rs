//! Browser-local storage shared between tabs, with change notification.
//!
//! Writes are single-value replacements. A write that changes a value is
//! announced on a broadcast channel tagged with the writer's origin so other
//! handles can react, the way a `storage` event reaches every other tab.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use ulid::Ulid;

use super::identity::UserIdentity;

pub const TOKEN_KEY: &str = "lf_token";
pub const CACHED_USER_KEY: &str = "auth-user";
pub const PENDING_EMAIL_KEY: &str = "pendingEmail";

const EVENT_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// Handle that made the change.
    pub origin: Ulid,
}

#[derive(Debug)]
struct Shared {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// Storage of one browser profile.
#[derive(Clone, Debug)]
pub struct SessionStore {
    shared: Arc<Shared>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    /// A new handle with its own origin, i.e. a new tab.
    #[must_use]
    pub fn handle(&self) -> StorageHandle {
        StorageHandle {
            shared: self.shared.clone(),
            origin: Ulid::new(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct StorageHandle {
    shared: Arc<Shared>,
    origin: Ulid,
}

impl StorageHandle {
    #[must_use]
    pub fn origin(&self) -> Ulid {
        self.origin
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.shared
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: String) {
        let previous = self
            .shared
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        if previous.as_deref() != Some(value.as_str()) {
            self.notify(key);
        }
    }

    pub fn remove(&self, key: &str) {
        let previous = self
            .shared
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if previous.is_some() {
            self.notify(key);
        }
    }

    /// Every change made through any handle, including this one.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.shared.events.subscribe()
    }

    fn notify(&self, key: &str) {
        // Nobody listening is fine.
        let _ = self.shared.events.send(StorageEvent {
            key: key.to_string(),
            origin: self.origin,
        });
    }
}

/// Typed access to the session keys of one handle.
#[derive(Clone, Debug)]
pub struct TokenStore {
    storage: StorageHandle,
}

impl TokenStore {
    #[must_use]
    pub fn new(storage: StorageHandle) -> Self {
        Self { storage }
    }

    #[must_use]
    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.storage
            .get(TOKEN_KEY)
            .filter(|token| !token.is_empty())
            .map(SecretString::from)
    }

    pub fn set_token(&self, token: &SecretString) {
        self.storage
            .set(TOKEN_KEY, token.expose_secret().to_string());
    }

    pub fn clear_token(&self) {
        self.storage.remove(TOKEN_KEY);
    }

    /// Cached identity snapshot; unreadable snapshots count as absent.
    #[must_use]
    pub fn cached_user(&self) -> Option<UserIdentity> {
        let raw = self.storage.get(CACHED_USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                debug!("ignoring unreadable cached user: {err}");
                None
            }
        }
    }

    pub fn cache_user(&self, user: &UserIdentity) {
        match serde_json::to_string(user) {
            Ok(raw) => self.storage.set(CACHED_USER_KEY, raw),
            Err(err) => warn!("failed to cache user: {err}"),
        }
    }

    pub fn clear_cached_user(&self) {
        self.storage.remove(CACHED_USER_KEY);
    }

    #[must_use]
    pub fn pending_email(&self) -> Option<String> {
        self.storage
            .get(PENDING_EMAIL_KEY)
            .filter(|email| !email.trim().is_empty())
    }

    pub fn set_pending_email(&self, email: &str) {
        self.storage
            .set(PENDING_EMAIL_KEY, email.trim().to_string());
    }

    pub fn clear_pending_email(&self) {
        self.storage.remove(PENDING_EMAIL_KEY);
    }
}
