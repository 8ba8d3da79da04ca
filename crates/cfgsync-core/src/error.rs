//! Error types for cfgsync-core

use std::path::PathBuf;

/// Result type for cfgsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cfgsync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two packages claim the same config name
    #[error("Config item '{name}' is claimed by both the '{package}' and '{other}' packages")]
    OwnershipConflict {
        name: String,
        package: String,
        other: String,
    },

    /// A package both provides and deletes the same config name, a kind of
    /// ownership conflict (see [`Error::is_ownership_conflict`])
    #[error(
        "Config item '{name}' is provided by the '{package}' package but also listed for deletion"
    )]
    ProvideDeleteConflict { name: String, package: String },

    /// Pending changes depend on each other in a cycle
    #[error("Cyclic dependency between config items: {}", participants.join(", "))]
    CyclicDependency { participants: Vec<String> },

    /// Another synchronization holds the lock
    #[error("Another process may be synchronizing configuration already")]
    SyncInProgress,

    /// The apply mechanism reported errors
    #[error("Applying configuration failed: {}", errors.join("; "))]
    ApplyFailure { errors: Vec<String> },

    /// An exported name has no value in the target store
    #[error("Config '{name}' of package '{package}' not found in the target store")]
    MissingSourceRecord { package: String, name: String },

    /// Config shipped by a package already exists in the target store
    #[error("Configuration objects provided by {package} already exist: {}", names.join(", "))]
    PreExistingConfig { package: String, names: Vec<String> },

    /// Package is not installed
    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    /// Settings file could not be parsed
    #[error("Invalid settings in {path}: {source}")]
    InvalidSettings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Settings value out of range
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    // Transparent wrappers for underlying crate errors
    /// Storage error from cfgsync-fs
    #[error(transparent)]
    Fs(#[from] cfgsync_fs::Error),

    /// Content error from cfgsync-content
    #[error(transparent)]
    Content(#[from] cfgsync_content::Error),

    /// Package error from cfgsync-extensions
    #[error(transparent)]
    Extensions(#[from] cfgsync_extensions::Error),
}

impl Error {
    /// Whether retrying later may succeed.
    ///
    /// Operational failures are retryable; conflicts and cycles come from
    /// the input and fail again until it changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SyncInProgress | Self::ApplyFailure { .. })
    }

    /// Whether this is an ownership conflict: two packages claiming one
    /// name, or one package both providing and deleting it.
    pub fn is_ownership_conflict(&self) -> bool {
        matches!(
            self,
            Self::OwnershipConflict { .. } | Self::ProvideDeleteConflict { .. }
        )
    }
}
