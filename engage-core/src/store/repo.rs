//! SQLite-backed durable store
//!
//! A single `kv_entries` table holds every namespace; [`SqliteStore`] is a
//! [`KeyValueStore`] view over one namespace.

use super::KeyValueStore;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Namespace for state that outlives a tab (visitor id, email, view records)
pub const DURABLE_NAMESPACE: &str = "local";

/// Namespace for per-tab state (session id, previous URL)
pub const TRANSIENT_NAMESPACE: &str = "session";

/// A stored entry with its last write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============================================
    // Key-value operations
    // ============================================

    /// Read one value
    pub fn get_value(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let conn = self.connection();
        conn.query_row(
            "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    /// Insert or overwrite one value
    pub fn set_value(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            r#"
            INSERT INTO kv_entries (namespace, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![namespace, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete one value
    pub fn remove_value(&self, namespace: &str, key: &str) -> Result<()> {
        let conn = self.connection();
        conn.execute(
            "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(())
    }

    /// Delete every entry of a namespace, returning how many were removed
    pub fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        let conn = self.connection();
        let removed = conn.execute("DELETE FROM kv_entries WHERE namespace = ?1", [namespace])?;
        Ok(removed)
    }

    /// List a namespace, most recently updated first
    pub fn list_entries(&self, namespace: &str) -> Result<Vec<StoredEntry>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT key, value, updated_at FROM kv_entries
             WHERE namespace = ?1
             ORDER BY updated_at DESC, key ASC",
        )?;

        let rows = stmt.query_map([namespace], |row| {
            let updated_at: String = row.get(2)?;
            Ok(StoredEntry {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_default(),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

/// One namespace of a [`Database`] exposed as a [`KeyValueStore`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
    namespace: String,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    /// Store over the durable namespace
    pub fn durable(db: Arc<Database>) -> Self {
        Self::new(db, DURABLE_NAMESPACE)
    }

    /// Store over the per-tab namespace
    pub fn transient(db: Arc<Database>) -> Self {
        Self::new(db, TRANSIENT_NAMESPACE)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn entries(&self) -> Result<Vec<StoredEntry>> {
        self.db.list_entries(&self.namespace)
    }

    pub fn clear(&self) -> Result<usize> {
        self.db.clear_namespace(&self.namespace)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.db.get_value(&self.namespace, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db.set_value(&self.namespace, key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.remove_value(&self.namespace, key)
    }
}
