//! SQLite snapshot backend
//!
//! Keeps the snapshot under one key of a small key/value table, mirroring a
//! browser-style local store. The value is the same JSON array the file
//! backend writes.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::models::Qso;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::persistence::{decode_snapshot, SnapshotStore};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Key holding the contact snapshot
pub const SNAPSHOT_KEY: &str = "qsos";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Snapshot storage
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: rusqlite::Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

/// Snapshot kept in a SQLite key/value table
#[derive(Debug, Clone)]
pub struct SqliteSnapshot {
    path: PathBuf,
}

impl SqliteSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the database, creating it and its schema on first use
    fn open(&self) -> StorageResult<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
        }

        let conn = Connection::open(&self.path)?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        Ok(conn)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for SqliteSnapshot {
    fn load(&self) -> StorageResult<Option<Vec<Qso>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let conn = self.open()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![SNAPSHOT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(json) => decode_snapshot(&json, self.path()).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, qsos: &[Qso]) -> StorageResult<()> {
        let json = serde_json::to_string(qsos)?;
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![SNAPSHOT_KEY, json],
        )?;
        Ok(())
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}
