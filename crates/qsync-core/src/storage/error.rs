//! Snapshot storage errors
//!
//! The replica never fails on these: `Persistence` logs them together with
//! `recovery_suggestion` and carries on with an empty or unsaved log.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No permission to write '{path}'")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Out of disk space writing '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not read snapshot '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Snapshot exists but is not a JSON list of contacts
    #[error("Snapshot '{path}' is not a list of QSOs: {details}")]
    InvalidFormat { path: PathBuf, details: String },

    #[error("SQLite: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Could not encode snapshot: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The temp file was written but could not replace the snapshot
    #[error("Could not move '{from}' over '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Wrap a write-side I/O error, classifying permission and space problems
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            StorageError::PermissionDenied {
                path,
                source: error,
            }
        } else if is_disk_full(&error) {
            StorageError::DiskFull {
                path,
                source: error,
            }
        } else {
            StorageError::WriteError {
                path,
                source: error,
            }
        }
    }

    /// Hint shown next to the logged error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free some disk space; the next change retries."),
            StorageError::PermissionDenied { .. } => {
                Some("Check permissions on data_dir, or point data_dir somewhere writable.")
            }
            StorageError::InvalidFormat { .. } => {
                Some("Starting from an empty log. Re-import an export to restore it.")
            }
            StorageError::Database(_) => Some("Try `qsync config set storage file`."),
            _ => None,
        }
    }
}

fn is_disk_full(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    ["no space left", "disk full", "quota exceeded", "not enough space"]
        .iter()
        .any(|needle| msg.contains(needle))
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/data/qsos.json"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(io_err, PathBuf::from("/full/qsos.json.tmp"));

        assert!(matches!(err, StorageError::DiskFull { .. }));
    }

    #[test]
    fn test_other_io_is_write_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = StorageError::from_io(io_err, PathBuf::from("/missing/qsos.json"));

        assert!(matches!(err, StorageError::WriteError { .. }));
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_invalid_format_display() {
        let err = StorageError::InvalidFormat {
            path: PathBuf::from("/data/qsos.json"),
            details: "expected a list".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("not a list of QSOs"));
        assert!(msg.contains("/data/qsos.json"));
        assert!(err.recovery_suggestion().is_some());
    }
}
