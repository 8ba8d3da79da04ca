//! Discovered packages and their kinds.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manifest::{OwnershipLists, PackageManifest};

/// The kind of an installable package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Module,
    Theme,
    Profile,
}

impl PackageKind {
    /// Processing group: modules and profiles before themes.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Module | Self::Profile => 0,
            Self::Theme => 1,
        }
    }

    /// The dependency type this kind is recorded under.
    ///
    /// Profiles are installed like modules and are depended on as such.
    pub fn dependency_type(self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Module | Self::Profile => "module",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::Theme => write!(f, "theme"),
            Self::Profile => write!(f, "profile"),
        }
    }
}

/// Validate a package machine name.
///
/// Machine names are lowercase ASCII letters, digits and underscores, and
/// must not start with a digit.
pub fn validate_machine_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("machine name must not be empty")
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        Some("machine name must not start with a digit")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        Some("machine name must contain only lowercase letters, digits, or underscores")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// An installed package with its parsed manifest.
#[derive(Debug, Clone)]
pub struct Package {
    /// Machine name, taken from the manifest file name.
    pub name: String,
    pub kind: PackageKind,
    pub weight: i64,
    /// Package root directory.
    pub path: PathBuf,
    pub enabled: bool,
    pub manifest: Arc<PackageManifest>,
}

impl Package {
    /// Build a package from its machine name, root directory and manifest.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        manifest: Arc<PackageManifest>,
    ) -> Result<Self> {
        let name = name.into();
        validate_machine_name(&name)?;
        Ok(Self {
            kind: manifest.kind,
            weight: manifest.weight,
            name,
            path: path.into(),
            enabled: true,
            manifest,
        })
    }

    /// Mark the package enabled or disabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Path of the manifest file inside the package root.
    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.path, &self.name)
    }

    /// The config directory of the package for the given sub-directory.
    pub fn config_dir(&self, subdir: &str) -> PathBuf {
        self.path.join(subdir)
    }

    /// Whether the package takes part in config ownership.
    pub fn participates(&self) -> bool {
        self.manifest.participates()
    }

    /// Declared ownership lists, if the package takes part.
    pub fn ownership(&self) -> Option<&OwnershipLists> {
        self.manifest.cfgsync.as_ref()
    }

    /// Machine names of the packages this one requires.
    pub fn required_packages(&self) -> BTreeSet<String> {
        self.manifest.required_packages()
    }

    /// Ordering key: modules and profiles first, heavier first, then by name.
    pub fn sort_key(&self) -> (u8, std::cmp::Reverse<i64>, &str) {
        (
            self.kind.precedence(),
            std::cmp::Reverse(self.weight),
            self.name.as_str(),
        )
    }
}

pub(crate) fn manifest_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{name}{}", crate::MANIFEST_SUFFIX))
}
