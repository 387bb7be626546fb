//! Key-value persistence for visitor state
//!
//! Everything the widget remembers between page views is a plain string
//! under a well-known key. Two backends implement [`KeyValueStore`]:
//! - [`MemoryStore`]: in-process map, used for the per-tab transient store and tests
//! - [`SqliteStore`]: a namespace inside the SQLite [`Database`]

pub mod repo;
pub mod schema;

pub use repo::{Database, SqliteStore};

use crate::error::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// Well-known store keys.
pub mod keys {
    /// Persistent visitor id (durable store)
    pub const VISITOR_ID: &str = "visitor_id";
    /// Per-tab session id (transient store)
    pub const SESSION_ID: &str = "session_id";
    /// Email captured by the pre-chat form (durable store)
    pub const USER_EMAIL: &str = "user_email";
    /// Set to `"true"` once a first visit has dwelled long enough (durable store)
    pub const RETURNING_VISITOR: &str = "returning_visitor";
    /// Last URL tracked in this tab, used as the next page view's referrer (transient store)
    pub const PREV_URL: &str = "prev_url";
    /// In-flight SEO performance audit marker
    pub const SEO_PERFORMANCE: &str = "seo_progress:performance";
    /// In-flight SEO compliance check marker
    pub const SEO_COMPLIANCE: &str = "seo_progress:compliance";

    /// Campaign view records of one visitor
    pub fn campaign_views(visitor_id: &str) -> String {
        format!("campaign_views:{}", visitor_id)
    }
}

/// A string key-value store.
///
/// Implementations take `&self` so one store can be shared between the
/// tracker, the frequency guard and the dispatcher behind an `Arc`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, as when the browser clears site data
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
