//! Storage layer for pagewarden.
//!
//! Persists both halves of browser storage using `rusqlite`:
//! - `local_storage`: per-origin string values (the page's `localStorage`),
//!   where the synchronized volume lives;
//! - `extension_storage`: JSON values in a named storage area shared by the
//!   extension, where the allow-list lives.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The engines are single-threaded and share one `Rc<Database>`; see
//! [`Database::origin_storage`].
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 format (e.g.,
//! `2024-01-15T10:30:00Z`), always UTC, so lexicographic order matches
//! chronological order.

use std::path::Path;
use std::rc::Rc;

use chrono::{SecondsFormat, Utc};
use pw_core::{LocalStorage, PatternStore, StoreError, URL_PATTERNS_KEY};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Extension storage area holding the allow-list.
pub const STORAGE_AREA: &str = "local";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored JSON value could not be encoded or decoded.
    #[error("invalid JSON for {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Json { key, source } => Self::Corrupt {
                key,
                message: source.to_string(),
            },
            DbError::Sqlite(e) => Self::Backend(e.to_string()),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A local-storage value and the origin it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub origin: String,
    pub value: String,
    pub updated_at: String,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Per-origin string values (window.localStorage)
            CREATE TABLE IF NOT EXISTS local_storage (
                origin TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (origin, key)
            );

            -- Extension-wide JSON values (storage.local and friends)
            CREATE TABLE IF NOT EXISTS extension_storage (
                area TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (area, key)
            );
            ",
        )?;
        Ok(())
    }

    /// Reads a local-storage value.
    pub fn local_get(&self, origin: &str, key: &str) -> Result<Option<String>, DbError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_storage WHERE origin = ? AND key = ?",
                params![origin, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes a local-storage value, replacing any previous one.
    pub fn local_set(&self, origin: &str, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO local_storage (origin, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (origin, key) DO UPDATE
            SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![origin, key, value, now()],
        )?;
        Ok(())
    }

    /// Lists the value of `key` for every origin that has one, ordered by
    /// origin.
    pub fn local_entries(&self, key: &str) -> Result<Vec<LocalEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT origin, value, updated_at
            FROM local_storage
            WHERE key = ?
            ORDER BY origin ASC
            ",
        )?;
        let rows = stmt.query_map([key], |row| {
            Ok(LocalEntry {
                origin: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Reads and decodes an extension-storage value.
    pub fn extension_get<T: DeserializeOwned>(
        &self,
        area: &str,
        key: &str,
    ) -> Result<Option<T>, DbError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM extension_storage WHERE area = ? AND key = ?",
                params![area, key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| DbError::Json {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Encodes and writes an extension-storage value.
    pub fn extension_set<T: Serialize + ?Sized>(
        &self,
        area: &str,
        key: &str,
        value: &T,
    ) -> Result<(), DbError> {
        let raw = serde_json::to_string(value).map_err(|source| DbError::Json {
            key: key.to_string(),
            source,
        })?;
        self.conn.execute(
            "
            INSERT INTO extension_storage (area, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (area, key) DO UPDATE
            SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![area, key, raw, now()],
        )?;
        Ok(())
    }

    /// The persisted allow-list; empty if never written.
    pub fn url_patterns(&self) -> Result<Vec<String>, DbError> {
        Ok(self
            .extension_get(STORAGE_AREA, URL_PATTERNS_KEY)?
            .unwrap_or_default())
    }

    pub fn set_url_patterns(&self, patterns: &[String]) -> Result<(), DbError> {
        self.extension_set(STORAGE_AREA, URL_PATTERNS_KEY, patterns)
    }

    /// Local storage of one origin, backed by this database.
    pub fn origin_storage(self: &Rc<Self>, origin: impl Into<String>) -> OriginStorage {
        OriginStorage {
            db: Rc::clone(self),
            origin: origin.into(),
        }
    }
}

impl PatternStore for Database {
    async fn load_patterns(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.url_patterns()?)
    }

    async fn save_patterns(&self, patterns: &[String]) -> Result<(), StoreError> {
        Ok(self.set_url_patterns(patterns)?)
    }
}

/// [`LocalStorage`] for one origin.
#[derive(Clone)]
pub struct OriginStorage {
    db: Rc<Database>,
    origin: String,
}

impl OriginStorage {
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl LocalStorage for OriginStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.db.local_get(&self.origin, key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, origin = %self.origin, key, "local storage read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.db.local_set(&self.origin, key, value)?)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
