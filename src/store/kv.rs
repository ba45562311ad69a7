//! Key-value backends for persisted state.
//!
//! Values are opaque byte blobs addressed by string keys. The snapshot
//! store layers slot encoding and migration on top.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument, trace};

use crate::config::default_state_path;
use crate::error::{LayoutError, Result};

/// get/set/remove of opaque blobs by key.
pub trait KeyValueStore: Send {
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if the backend fails.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace a value.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if the backend fails.
    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if the backend fails.
    fn remove(&mut self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if the backend fails.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// SQLite schema for key-value storage.
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// SQLite-backed store.
pub struct SqliteKvStore {
    conn: Connection,
}

impl SqliteKvStore {
    /// Opens or creates a database at the standard location.
    ///
    /// Location: `~/.local/share/winlayout/state.db`
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be determined or opened.
    #[instrument]
    pub fn open_default() -> Result<Self> {
        let path = default_state_path()?;
        Self::open(&path)
    }

    /// Opens or creates a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if the file cannot be opened or the
    /// schema cannot be created.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LayoutError::Storage(format!(
                        "Failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        debug!(path = %path.display(), "Opening state database");
        let conn = Connection::open(path)
            .map_err(|e| LayoutError::Storage(format!("Failed to open database: {e}")))?;

        let db = Self { conn };
        db.init_schema()?;
        info!(path = %path.display(), "State database ready");
        Ok(db)
    }

    /// Creates an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Storage`] if SQLite cannot allocate it.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LayoutError::Storage(format!("Failed to create in-memory database: {e}"))
        })?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| LayoutError::Storage(format!("Failed to initialize schema: {e}")))
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        trace!(key, "kv get");
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| LayoutError::Storage(format!("Failed to read {key}: {e}")))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        trace!(key, bytes = value.len(), "kv set");
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map_err(|e| LayoutError::Storage(format!("Failed to write {key}: {e}")))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        trace!(key, "kv remove");
        let rows = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| LayoutError::Storage(format!("Failed to remove {key}: {e}")))?;
        Ok(rows > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .map_err(|e| LayoutError::Storage(format!("Failed to prepare query: {e}")))?;

        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))
            .map_err(|e| LayoutError::Storage(format!("Failed to list keys: {e}")))?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| LayoutError::Storage(format!("Failed to read key: {e}")))?;
        Ok(keys)
    }
}

/// In-memory store, used by tests and when no state file is wanted.
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
