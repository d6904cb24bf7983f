use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Filesystem error at {}: {message}", path.display())]
    Filesystem { path: PathBuf, message: String },

    #[error("Unreadable media header in {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("Failed to hash {}: {message}", path.display())]
    Hash { path: PathBuf, message: String },

    #[error("Worker pool rejected task: {0}")]
    Submission(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Failed to start watcher for {}: {message}", path.display())]
    WatcherStart { path: PathBuf, message: String },

    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidIgnorePattern { pattern: String, message: String },
}

impl IndexError {
    /// Map an IO error raised while touching `path` onto the taxonomy.
    pub fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => IndexError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => {
                IndexError::PermissionDenied(path)
            }
            _ => IndexError::Filesystem {
                path,
                message: err.to_string(),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Io(_) | IndexError::Filesystem { .. } => {
                ErrorKind::Filesystem
            }
            IndexError::NotFound(_) => ErrorKind::NotFound,
            IndexError::NotADirectory(_) => ErrorKind::NotADirectory,
            IndexError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            IndexError::Format { .. } => ErrorKind::Format,
            IndexError::Hash { .. } => ErrorKind::Hash,
            IndexError::Submission(_) => ErrorKind::Submission,
            IndexError::Persistence(_) => ErrorKind::Persistence,
            IndexError::WatcherStart { .. } => ErrorKind::WatcherStart,
            IndexError::InvalidIgnorePattern { .. } => {
                ErrorKind::InvalidIgnorePattern
            }
        }
    }

    /// Path the error refers to, when it is about a single filesystem entry.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            IndexError::NotFound(path)
            | IndexError::NotADirectory(path)
            | IndexError::PermissionDenied(path)
            | IndexError::Filesystem { path, .. }
            | IndexError::Format { path, .. }
            | IndexError::Hash { path, .. }
            | IndexError::WatcherStart { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Serializable discriminant of [`IndexError`], carried in scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    NotADirectory,
    PermissionDenied,
    Filesystem,
    Format,
    Hash,
    Submission,
    Persistence,
    WatcherStart,
    InvalidIgnorePattern,
}

pub type Result<T> = std::result::Result<T, IndexError>;
