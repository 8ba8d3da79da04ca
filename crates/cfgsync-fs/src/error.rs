//! Error types for cfgsync-fs

use std::path::PathBuf;

/// Result type for cfgsync-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cfgsync-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config record '{name}' at {path}: {message}")]
    RecordParse {
        name: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to serialize config record '{name}': {message}")]
    RecordSerialize { name: String, message: String },

    #[error("Invalid config name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
