use std::path::PathBuf;

/// Errors that can occur in the package system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to parse package manifest YAML.
    #[error("failed to parse package manifest: {0}")]
    ManifestParse(#[from] serde_yaml::Error),

    /// A manifest file on disk failed to load.
    #[error("invalid package manifest {path}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Package manifest file not found at the expected path.
    #[error("package manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// Invalid semver version string.
    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        source: semver::Error,
    },

    /// Invalid package machine name.
    #[error("invalid package name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Package not found in the registry.
    #[error("unknown package: {0}")]
    UnknownPackage(String),

    /// Storage or content layer failure.
    #[error(transparent)]
    Fs(#[from] cfgsync_fs::Error),

    #[error(transparent)]
    Content(#[from] cfgsync_content::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
