//! Local store errors
//!
//! Every failure the SQLite store can report, with a hint for the ones a
//! user can do something about.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the local store
#[derive(Error, Debug)]
pub enum StorageError {
    /// The data directory could not be created
    #[error("Cannot create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The OS refused access to the data directory
    #[error("No permission to use '{path}'")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No room left for the database
    #[error("Out of disk space at '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted row could not be turned back into a record
    #[error("Corrupt row in '{table}': {details}")]
    CorruptRow { table: &'static str, details: String },

    /// An item points at a location that does not exist for its owner
    #[error("Item {item} references location {location}, which does not exist for this user")]
    InvalidReference { item: Uuid, location: Uuid },

    /// Another thread panicked while holding the connection
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Messages the OS uses for a full disk or exhausted quota
const DISK_FULL_HINTS: &[&str] = &["no space left", "disk full", "quota exceeded", "not enough space"];

impl StorageError {
    /// Classify an I/O failure while preparing the data directory at `path`
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            return StorageError::PermissionDenied {
                path,
                source: error,
            };
        }

        let text = error.to_string().to_lowercase();
        if DISK_FULL_HINTS.iter().any(|hint| text.contains(hint)) {
            StorageError::DiskFull {
                path,
                source: error,
            }
        } else {
            StorageError::CreateDirectory {
                path,
                source: error,
            }
        }
    }

    pub(crate) fn corrupt(table: &'static str, details: impl Into<String>) -> Self {
        StorageError::CorruptRow {
            table,
            details: details.into(),
        }
    }

    /// Whether the user can fix this and retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::InvalidReference { .. }
        )
    }

    /// What to try next, if anything
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free some disk space, then run the command again."),
            StorageError::PermissionDenied { .. } => {
                Some("Point data_dir somewhere writable with `larder config set data_dir <path>`.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Make sure the parent of data_dir exists and is writable.")
            }
            StorageError::InvalidReference { .. } => {
                Some("Create the location first, or pick an existing one with `larder location list`.")
            }
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_classification() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(io_err, PathBuf::from("/srv/larder"));

        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("/srv/larder"));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_disk_full_detection() {
        let io_err = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(io_err, PathBuf::from("/full/disk"));

        assert!(matches!(err, StorageError::DiskFull { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_other_io_is_create_directory() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err = StorageError::from_io(io_err, PathBuf::from("/data"));
        assert!(matches!(err, StorageError::CreateDirectory { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_invalid_reference_display() {
        let item = Uuid::new_v4();
        let location = Uuid::new_v4();
        let err = StorageError::InvalidReference { item, location };

        let msg = err.to_string();
        assert!(msg.contains(&item.to_string()));
        assert!(msg.contains(&location.to_string()));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_corrupt_row_has_no_suggestion() {
        let err = StorageError::corrupt("locations", "invalid id 'x'");
        assert_eq!(err.to_string(), "Corrupt row in 'locations': invalid id 'x'");
        assert!(err.recovery_suggestion().is_none());
        assert!(!err.is_recoverable());
    }
}
