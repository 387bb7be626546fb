//! Visitor and session identity
//!
//! The visitor id lives in the durable store and never changes once
//! created. The session id lives in the per-tab transient store and is
//! regenerated whenever that store is empty.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{keys, KeyValueStore};
use crate::types::VisitorIdentity;

/// Length of the random suffix of generated ids
const SUFFIX_LEN: usize = 13;

/// Generate an id of the form `<unix-millis>-<random suffix>`.
pub fn generate_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &random[..SUFFIX_LEN])
}

/// Reads and lazily creates visitor identifiers.
#[derive(Clone)]
pub struct IdentityManager {
    durable: Arc<dyn KeyValueStore>,
    transient: Arc<dyn KeyValueStore>,
}

impl IdentityManager {
    pub fn new(durable: Arc<dyn KeyValueStore>, transient: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, transient }
    }

    pub fn durable_store(&self) -> &Arc<dyn KeyValueStore> {
        &self.durable
    }

    pub fn transient_store(&self) -> &Arc<dyn KeyValueStore> {
        &self.transient
    }

    /// Persistent visitor id, created on first access
    pub fn get_or_create_visitor_id(&self) -> Result<String> {
        get_or_create(self.durable.as_ref(), keys::VISITOR_ID, "visitor")
    }

    /// Per-tab session id, created on first access in this tab
    pub fn get_or_create_session_id(&self) -> Result<String> {
        get_or_create(self.transient.as_ref(), keys::SESSION_ID, "session")
    }

    /// Email captured by the pre-chat form
    pub fn email(&self) -> Result<Option<String>> {
        Ok(self
            .durable
            .get(keys::USER_EMAIL)?
            .filter(|email| !email.is_empty()))
    }

    pub fn set_email(&self, email: &str) -> Result<()> {
        self.durable.set(keys::USER_EMAIL, email)
    }

    /// Snapshot of all three identifiers
    pub fn identity(&self) -> Result<VisitorIdentity> {
        Ok(VisitorIdentity {
            visitor_id: self.get_or_create_visitor_id()?,
            session_id: self.get_or_create_session_id()?,
            email: self.email()?,
        })
    }
}

fn get_or_create(store: &dyn KeyValueStore, key: &str, kind: &str) -> Result<String> {
    if let Some(existing) = store.get(key)?.filter(|id| !id.is_empty()) {
        return Ok(existing);
    }

    let id = generate_id();
    store.set(key, &id)?;
    tracing::debug!(kind, id = %id, "Created identifier");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> (IdentityManager, Arc<MemoryStore>, Arc<MemoryStore>) {
        let durable = Arc::new(MemoryStore::new());
        let transient = Arc::new(MemoryStore::new());
        (
            IdentityManager::new(durable.clone(), transient.clone()),
            durable,
            transient,
        )
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id();
        let (millis, suffix) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(), id);
    }

    #[test]
    fn test_visitor_id_is_stable() {
        let (identity, durable, _) = manager();
        let first = identity.get_or_create_visitor_id().unwrap();
        let second = identity.get_or_create_visitor_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(durable.get(keys::VISITOR_ID).unwrap(), Some(first));
    }

    #[test]
    fn test_new_tab_gets_new_session_but_same_visitor() {
        let (identity, _, transient) = manager();
        let visitor = identity.get_or_create_visitor_id().unwrap();
        let session = identity.get_or_create_session_id().unwrap();

        transient.clear();

        assert_eq!(identity.get_or_create_visitor_id().unwrap(), visitor);
        assert_ne!(identity.get_or_create_session_id().unwrap(), session);
    }

    #[test]
    fn test_email_roundtrip() {
        let (identity, _, _) = manager();
        assert_eq!(identity.email().unwrap(), None);
        identity.set_email("a@example.com").unwrap();
        let snapshot = identity.identity().unwrap();
        assert_eq!(snapshot.email.as_deref(), Some("a@example.com"));
    }
}
