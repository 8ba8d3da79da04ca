//! Settings parsed from one or more `cfgsync.toml` layers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dependency::CORE_NAMESPACE;
use crate::normalize::{DEFAULT_IGNORE_KEYS, Normalizer};
use crate::{Error, Result};

fn default_subdir() -> String {
    "config/install".to_string()
}

fn default_ignore_keys() -> Vec<String> {
    DEFAULT_IGNORE_KEYS.iter().map(|key| key.to_string()).collect()
}

fn default_core_namespace() -> String {
    CORE_NAMESPACE.to_string()
}

fn default_lock_file() -> String {
    ".cfgsync.lock".to_string()
}

/// Which dependencies an export pulls in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithDependencies {
    /// Every config dependency, plus missing module dependencies.
    #[default]
    All,
    /// Only dependencies not already provided by required packages.
    NotProvided,
    /// Export owned config only.
    None,
}

impl WithDependencies {
    pub fn enabled(self) -> bool {
        self != Self::None
    }

    pub fn exclude_provided(self) -> bool {
        self == Self::NotProvided
    }
}

/// The `[sync]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Config sub-directory inside each package.
    pub subdir: String,
    /// Treat unmanaged config like managed config.
    pub force_unmanaged: bool,
    /// Sort keys and drop empty containers when exporting.
    pub fully_normalize: bool,
    pub with_dependencies: WithDependencies,
    /// Dependency recursion limit; 0 is unlimited.
    pub recursion_limit: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            subdir: default_subdir(),
            force_unmanaged: false,
            fully_normalize: false,
            with_dependencies: WithDependencies::default(),
            recursion_limit: 0,
        }
    }
}

/// The `[normalize]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSection {
    pub ignore_keys: Vec<String>,
}

impl Default for NormalizeSection {
    fn default() -> Self {
        Self {
            ignore_keys: default_ignore_keys(),
        }
    }
}

/// The `[site]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    /// Namespace of the host, never reported as a dependency.
    pub core_namespace: String,
    /// Lock file guarding imports, relative to the site root.
    pub lock_file: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            core_namespace: default_core_namespace(),
            lock_file: default_lock_file(),
        }
    }
}

/// Effective settings after merging every layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub sync: SyncSection,
    pub normalize: NormalizeSection,
    pub site: SiteSection,
}

impl SyncSettings {
    /// Parse a single TOML document. Missing keys take their defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use cfgsync_core::config::{SyncSettings, WithDependencies};
    ///
    /// let settings = SyncSettings::parse(r#"
    /// [sync]
    /// with_dependencies = "not-provided"
    /// "#).unwrap();
    ///
    /// assert_eq!(settings.sync.with_dependencies, WithDependencies::NotProvided);
    /// assert_eq!(settings.sync.subdir, "config/install");
    /// ```
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reject values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        let subdir = Path::new(&self.sync.subdir);
        if self.sync.subdir.trim().is_empty() || subdir.is_absolute() {
            return Err(Error::InvalidSetting {
                key: "sync.subdir".to_string(),
                reason: "must be a non-empty relative path".to_string(),
            });
        }
        if self.site.lock_file.trim().is_empty() {
            return Err(Error::InvalidSetting {
                key: "site.lock_file".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.site.core_namespace.contains('.') {
            return Err(Error::InvalidSetting {
                key: "site.core_namespace".to_string(),
                reason: "must be a single namespace segment".to_string(),
            });
        }
        Ok(())
    }

    /// The recursion limit, `None` when unlimited.
    pub fn recursion_limit(&self) -> Option<usize> {
        Some(self.sync.recursion_limit).filter(|limit| *limit > 0)
    }

    /// A normalizer honouring the configured ignore keys.
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.normalize.ignore_keys.iter().cloned())
    }

    /// Path of the lock file for a site rooted at `root`.
    pub fn lock_path(&self, root: &Path) -> PathBuf {
        root.join(&self.site.lock_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_empty_document_gives_defaults() {
        let settings = SyncSettings::parse("").unwrap();

        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.sync.subdir, "config/install");
        assert_eq!(settings.normalize.ignore_keys, vec!["uuid", "_core"]);
        assert_eq!(settings.site.lock_file, ".cfgsync.lock");
        assert_eq!(settings.recursion_limit(), None);
    }

    #[rstest]
    #[case("all", WithDependencies::All)]
    #[case("not-provided", WithDependencies::NotProvided)]
    #[case("none", WithDependencies::None)]
    fn test_with_dependencies_modes(#[case] raw: &str, #[case] expected: WithDependencies) {
        let settings = SyncSettings::parse(&format!("[sync]\nwith_dependencies = \"{raw}\"")).unwrap();
        assert_eq!(settings.sync.with_dependencies, expected);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(SyncSettings::parse("[sync]\nwith_dependencies = \"some\"").is_err());
    }

    #[test]
    fn test_recursion_limit_zero_is_unlimited() {
        let settings = SyncSettings::parse("[sync]\nrecursion_limit = 3").unwrap();
        assert_eq!(settings.recursion_limit(), Some(3));
    }

    #[rstest]
    #[case("[sync]\nsubdir = \"\"", "sync.subdir")]
    #[case("[sync]\nsubdir = \"/etc/config\"", "sync.subdir")]
    #[case("[site]\nlock_file = \" \"", "site.lock_file")]
    #[case("[site]\ncore_namespace = \"core.system\"", "site.core_namespace")]
    fn test_invalid_values(#[case] content: &str, #[case] key: &str) {
        let err = SyncSettings::parse(content).unwrap().validate().unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { key: k, .. } if k == key));
    }

    #[test]
    fn test_normalizer_uses_configured_keys() {
        let settings = SyncSettings::parse("[normalize]\nignore_keys = [\"langcode\"]").unwrap();
        let normalizer = settings.normalizer();
        let keys: Vec<&str> = normalizer
            .ignore_keys()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["langcode"]);
    }
}
