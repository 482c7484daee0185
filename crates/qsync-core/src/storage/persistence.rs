//! Snapshot persistence
//!
//! Saves and loads the full contact set as one JSON array. Used only when
//! the replica has no transport. Every save rewrites the whole set; there is
//! no incremental log.
//!
//! The file backend uses atomic writes (write to temp file, then rename) so a
//! crash never leaves a half-written snapshot.
//!
//! Storage location: `~/.local/share/qsync/qsos.json` (configurable via `Config`)

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::models::Qso;
use crate::storage::error::{StorageError, StorageResult};

/// A place to keep one snapshot of the contact set
pub trait SnapshotStore: Send {
    /// Load the snapshot; `Ok(None)` when none has been saved
    fn load(&self) -> StorageResult<Option<Vec<Qso>>>;

    /// Replace the snapshot with `qsos`
    fn save(&self, qsos: &[Qso]) -> StorageResult<()>;

    /// Where the snapshot lives, for status output
    fn location(&self) -> PathBuf;
}

/// Snapshot kept in a single JSON file
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Check if a snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Delete the snapshot file if present
    pub fn delete(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, self.path.clone())),
        }
    }
}

impl SnapshotStore for FileSnapshot {
    fn load(&self) -> StorageResult<Option<Vec<Qso>>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::ReadError {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        decode_snapshot(&content, &self.path).map(Some)
    }

    fn save(&self, qsos: &[Qso]) -> StorageResult<()> {
        let json = serde_json::to_vec(qsos)?;
        atomic_write(&self.path, &json)
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}

/// Parse snapshot text as a JSON list of contacts
pub(crate) fn decode_snapshot(content: &str, path: &Path) -> StorageResult<Vec<Qso>> {
    serde_json::from_str(content).map_err(|e| StorageError::InvalidFormat {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
pub fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Vec<Qso> {
        let mut a = Qso::with_id("1", "W1AW", "2024-01-01T00:00");
        a.notes = "first".to_string();
        vec![a, Qso::with_id("2", "K1ABC", "2024-01-02T00:00")]
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = FileSnapshot::new(temp_dir.path().join("qsos.json"));

        assert!(!snapshot.exists());
        assert!(snapshot.load().unwrap().is_none());

        snapshot.save(&sample()).unwrap();
        assert!(snapshot.exists());

        let loaded = snapshot.load().unwrap().unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_save_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = FileSnapshot::new(temp_dir.path().join("qsos.json"));

        snapshot.save(&sample()).unwrap();
        snapshot.save(&sample()[..1]).unwrap();

        assert_eq!(snapshot.load().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_is_a_json_array() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("qsos.json");
        FileSnapshot::new(&path).save(&sample()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.as_array().unwrap().len(), 2);
        assert_eq!(raw[0]["callsign"], "W1AW");
    }

    #[test]
    fn test_malformed_snapshot_is_invalid_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("qsos.json");

        for content in ["{not json", "{\"callsign\":\"W1AW\"}", "42", "[1, 2]"] {
            fs::write(&path, content).unwrap();
            let err = FileSnapshot::new(&path).load().unwrap_err();
            assert!(matches!(err, StorageError::InvalidFormat { .. }), "{content}");
        }
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = FileSnapshot::new(temp_dir.path().join("qsos.json"));
        snapshot.save(&sample()).unwrap();

        snapshot.delete().unwrap();
        assert!(!snapshot.exists());
        snapshot.delete().unwrap();
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("a").join("b").join("qsos.json");

        atomic_write(&nested_path, b"[]").unwrap();

        assert!(nested_path.exists());
        assert_eq!(fs::read_to_string(&nested_path).unwrap(), "[]");
        assert!(!nested_path.with_extension("tmp").exists());
    }
}
