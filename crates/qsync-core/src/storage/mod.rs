//! Storage layer
//!
//! Snapshot persistence for a replica that runs without a transport.
//!
//! ## Backends
//!
//! - **file**: JSON array in `qsos.json`, written atomically
//! - **sqlite**: the same JSON array under one key of a key/value table
//!
//! `Persistence` wraps either backend and never fails: a missing or damaged
//! snapshot loads as empty, and a failed save is logged and dropped.

pub mod error;
pub mod persistence;
pub mod schema;

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::{Config, StorageBackend};
use crate::models::Qso;

pub use error::{StorageError, StorageResult};
pub use persistence::{atomic_write, FileSnapshot, SnapshotStore};
pub use schema::{init_schema, needs_init, SqliteSnapshot, SCHEMA_VERSION};

/// Best-effort snapshot persistence
pub struct Persistence {
    store: Box<dyn SnapshotStore>,
}

impl Persistence {
    pub fn new(store: impl SnapshotStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    /// Pick the backend named in the config
    pub fn from_config(config: &Config) -> Self {
        match config.storage {
            StorageBackend::File => Self::new(FileSnapshot::new(config.snapshot_path())),
            StorageBackend::Sqlite => Self::new(SqliteSnapshot::new(config.sqlite_path())),
        }
    }

    /// Load the snapshot, falling back to an empty set
    pub fn load(&self) -> Vec<Qso> {
        match self.store.load() {
            Ok(Some(qsos)) => {
                debug!(count = qsos.len(), "Loaded snapshot");
                qsos
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Ignoring unreadable snapshot: {}", e);
                if let Some(hint) = e.recovery_suggestion() {
                    warn!("{}", hint);
                }
                Vec::new()
            }
        }
    }

    /// Save the snapshot; returns whether it was written
    pub fn save(&self, qsos: &[Qso]) -> bool {
        match self.store.save(qsos) {
            Ok(()) => {
                debug!(count = qsos.len(), "Saved snapshot");
                true
            }
            Err(e) => {
                warn!("Failed to save snapshot: {}", e);
                false
            }
        }
    }

    pub fn location(&self) -> PathBuf {
        self.store.location()
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("location", &self.store.location())
            .finish()
    }
}
