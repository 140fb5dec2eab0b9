use serde::Serialize;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::models::{Algorithm, RecordId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Aborted(#[from] SearchAborted),

    #[error(transparent)]
    Remove(#[from] RemoveError),

    #[error(transparent)]
    Replace(#[from] ReplaceError),

    #[error("Unknown detector id '{0}'")]
    UnknownDetector(String),

    #[error("No database is open")]
    NoDatabase,

    #[error("{0}")]
    Other(String),
}

/// Failure to materialize a record set from its source.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a readable Soundminer database ({}): {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
}

impl LoadError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LoadError::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A per-record detector failure. Collected into the search results, never raised.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{algorithm:?} failed on record {record_id}: {message}")]
pub struct DetectorError {
    pub record_id: RecordId,
    pub algorithm: Algorithm,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchAborted {
    #[error("Search cancelled")]
    Cancelled,

    #[error("Search failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum RemoveError {
    /// Surfaced to the user with an elevated-privileges hint.
    #[error("PERMISSION_ERROR: {}: {message}", .path.display())]
    Permission { path: PathBuf, message: String },

    /// Holds the lock file path.
    #[error("Database is locked by another operation; delete {} if none is running", .0.display())]
    Locked(PathBuf),

    #[error("Invalid removal request: {0}")]
    Validation(String),

    #[error("Removal rolled back: {0}")]
    RolledBack(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl RemoveError {
    /// Classify an IO failure on `path`, keeping permission problems distinct.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            RemoveError::Permission {
                path: path.into(),
                message: err.to_string(),
            }
        } else {
            RemoveError::Io(err)
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, RemoveError::Permission { .. })
    }
}

#[derive(Error, Debug)]
pub enum ReplaceError {
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Nothing to find: the search text is empty")]
    EmptyFind,

    #[error("Search text cannot be matched: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Replace failed, no rows were changed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Load(#[from] LoadError),
}
