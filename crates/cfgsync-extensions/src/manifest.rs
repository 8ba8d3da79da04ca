//! Package manifest parsing for `<name>.info.yml` files.
//!
//! A manifest carries the package's human-readable label, its type, install
//! weight and package dependencies. Packages that take part in config
//! ownership add a `cfgsync` mapping listing the config names they own.
//!
//! # Example YAML
//!
//! ```yaml
//! name: Blog
//! type: module
//! weight: 5
//! version: 1.2.0
//! dependencies:
//!   - drupal:node
//!   - views (>=3.0)
//! cfgsync:
//!   managed:
//!     - node.type.article
//!     - field.storage.node.body
//!   unmanaged:
//!     - blog.settings
//!   delete:
//!     - views.view.frontpage
//! ```
//!
//! `create_only` is accepted as an alias for `unmanaged`. A package with an
//! empty `cfgsync:` key participates (and so is protected from pre-existing
//! config errors) without owning anything.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Complete package manifest loaded from `<name>.info.yml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PackageManifest {
    /// Human-readable label.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Package type.
    #[serde(rename = "type")]
    pub kind: crate::PackageKind,
    /// Install weight. Heavier packages are processed first.
    #[serde(default)]
    pub weight: i64,
    /// Semver version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Required packages, as written in the file.
    #[serde(default, deserialize_with = "nullable")]
    pub dependencies: Vec<String>,
    /// Declared config ownership, `None` when the package does not take part.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub cfgsync: Option<OwnershipLists>,
}

/// The config names a package claims.
///
/// A name listed as both managed and unmanaged is kept as managed only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "OwnershipDecl")]
pub struct OwnershipLists {
    /// Owned and kept in sync on every import.
    pub managed: BTreeSet<String>,
    /// Owned, but only created when missing.
    pub unmanaged: BTreeSet<String>,
    /// Owned because managed items depend on them.
    pub implicit: BTreeSet<String>,
    /// Removed from the target when present.
    pub delete: BTreeSet<String>,
}

#[derive(Deserialize)]
struct OwnershipDecl {
    #[serde(default, deserialize_with = "nullable")]
    managed: BTreeSet<String>,
    #[serde(default, deserialize_with = "nullable")]
    unmanaged: BTreeSet<String>,
    #[serde(default, deserialize_with = "nullable")]
    create_only: BTreeSet<String>,
    #[serde(default, deserialize_with = "nullable")]
    implicit: BTreeSet<String>,
    #[serde(default, deserialize_with = "nullable")]
    delete: BTreeSet<String>,
}

impl From<OwnershipDecl> for OwnershipLists {
    fn from(decl: OwnershipDecl) -> Self {
        let unmanaged = decl
            .unmanaged
            .into_iter()
            .chain(decl.create_only)
            .filter(|name| !decl.managed.contains(name))
            .collect();
        Self {
            managed: decl.managed,
            unmanaged,
            implicit: decl.implicit,
            delete: decl.delete,
        }
    }
}

/// An empty YAML key (`managed:`) reads as null; treat it as the default.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A present but empty `cfgsync:` key still marks the package as taking part.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<OwnershipLists>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(
        Option::<OwnershipLists>::deserialize(deserializer)?.unwrap_or_default(),
    ))
}

impl OwnershipLists {
    /// Names imported from the package: managed, unmanaged and implicit.
    pub fn importable(&self) -> BTreeSet<String> {
        self.managed
            .iter()
            .chain(&self.unmanaged)
            .chain(&self.implicit)
            .cloned()
            .collect()
    }

    /// Names exported to the package: managed and unmanaged.
    pub fn exportable(&self) -> BTreeSet<String> {
        self.managed.iter().chain(&self.unmanaged).cloned().collect()
    }

    /// Whether the name is only created, never overwritten.
    pub fn is_unmanaged(&self, name: &str) -> bool {
        self.unmanaged.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.managed.is_empty()
            && self.unmanaged.is_empty()
            && self.implicit.is_empty()
            && self.delete.is_empty()
    }

    fn names(&self) -> impl Iterator<Item = &String> {
        self.managed
            .iter()
            .chain(&self.unmanaged)
            .chain(&self.implicit)
            .chain(&self.delete)
    }
}

impl PackageManifest {
    /// Parse a package manifest from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a package manifest from a file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }
        let content = cfgsync_fs::io::read_text(path)?;
        Self::from_yaml(&content).map_err(|source| Error::InvalidManifest {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Serialize the manifest back to YAML.
    ///
    /// Comments and unknown keys are lost; use
    /// [`ManifestWriter`](crate::ManifestWriter) to edit files in place.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Whether the package takes part in config ownership.
    pub fn participates(&self) -> bool {
        self.cfgsync.is_some()
    }

    /// Machine names of required packages.
    ///
    /// `project:name` prefixes and trailing `(constraint)` parts are
    /// dropped, so `drupal:views (>=3.0)` yields `views`.
    pub fn required_packages(&self) -> BTreeSet<String> {
        self.dependencies
            .iter()
            .filter_map(|entry| {
                let without_constraint = entry.split('(').next().unwrap_or(entry).trim();
                let name = without_constraint
                    .rsplit_once(':')
                    .map_or(without_constraint, |(_, name)| name)
                    .trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect()
    }

    /// Parsed semver version, if one is declared.
    pub fn semver(&self) -> Result<Option<semver::Version>> {
        self.version
            .as_deref()
            .map(|version| {
                semver::Version::parse(version).map_err(|e| Error::InvalidVersion {
                    version: version.to_string(),
                    source: e,
                })
            })
            .transpose()
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidName {
                name: self.name.clone(),
                reason: "package label must not be empty".to_string(),
            });
        }

        self.semver()?;

        if let Some(lists) = &self.cfgsync {
            for name in lists.names() {
                cfgsync_fs::validate_config_name(name)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackageKind;
    use pretty_assertions::assert_eq;

    const BLOG_YAML: &str = r#"
name: Blog
type: module
weight: 5
version: 1.2.0
dependencies:
  - drupal:node
  - views (>=3.0)
cfgsync:
  managed:
    - node.type.article
  unmanaged:
    - blog.settings
  create_only:
    - blog.widgets
  delete:
    - views.view.frontpage
"#;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_full_manifest() {
        let manifest = PackageManifest::from_yaml(BLOG_YAML).unwrap();

        assert_eq!(manifest.name, "Blog");
        assert_eq!(manifest.kind, PackageKind::Module);
        assert_eq!(manifest.weight, 5);
        assert_eq!(manifest.semver().unwrap(), Some(semver::Version::new(1, 2, 0)));

        let lists = manifest.cfgsync.unwrap();
        assert_eq!(lists.managed, set(&["node.type.article"]));
        assert_eq!(lists.unmanaged, set(&["blog.settings", "blog.widgets"]));
        assert_eq!(lists.delete, set(&["views.view.frontpage"]));
        assert!(lists.implicit.is_empty());
    }

    #[test]
    fn test_required_packages_strip_project_and_constraint() {
        let manifest = PackageManifest::from_yaml(BLOG_YAML).unwrap();
        assert_eq!(manifest.required_packages(), set(&["node", "views"]));
    }

    #[test]
    fn test_missing_cfgsync_key_does_not_participate() {
        let manifest = PackageManifest::from_yaml("name: Plain\ntype: theme\n").unwrap();
        assert!(!manifest.participates());
        assert_eq!(manifest.weight, 0);
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_empty_cfgsync_key_participates() {
        let manifest = PackageManifest::from_yaml("name: Empty\ntype: module\ncfgsync:\n").unwrap();
        assert!(manifest.participates());
        assert!(manifest.cfgsync.unwrap().is_empty());
    }

    #[test]
    fn test_empty_lists_read_as_empty_sets() {
        let yaml = "name: x\ntype: module\ndependencies:\ncfgsync:\n  managed:\n  delete: []\n";
        let manifest = PackageManifest::from_yaml(yaml).unwrap();
        assert!(manifest.cfgsync.unwrap().is_empty());
    }

    #[test]
    fn test_managed_wins_over_unmanaged() {
        let yaml = "name: x\ntype: module\ncfgsync:\n  managed: [a.b]\n  unmanaged: [a.b, a.c]\n";
        let lists = PackageManifest::from_yaml(yaml).unwrap().cfgsync.unwrap();

        assert_eq!(lists.managed, set(&["a.b"]));
        assert_eq!(lists.unmanaged, set(&["a.c"]));
    }

    #[test]
    fn test_importable_and_exportable() {
        let yaml = "name: x\ntype: module\ncfgsync:\n  managed: [a.m]\n  unmanaged: [a.u]\n  implicit: [a.i]\n  delete: [a.d]\n";
        let lists = PackageManifest::from_yaml(yaml).unwrap().cfgsync.unwrap();

        assert_eq!(lists.importable(), set(&["a.i", "a.m", "a.u"]));
        assert_eq!(lists.exportable(), set(&["a.m", "a.u"]));
        assert!(lists.is_unmanaged("a.u"));
        assert!(!lists.is_unmanaged("a.m"));
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let err = PackageManifest::from_yaml("name: x\ntype: module\nversion: abc\n").unwrap_err();
        assert!(err.to_string().contains("abc"), "{err}");
    }

    #[test]
    fn test_empty_label_is_rejected() {
        let err = PackageManifest::from_yaml("name: ''\ntype: module\n").unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = PackageManifest::from_yaml("name: x\ntype: library\n").unwrap_err();
        assert!(matches!(err, Error::ManifestParse(_)));
    }

    #[test]
    fn test_invalid_config_name_is_rejected() {
        let yaml = "name: x\ntype: module\ncfgsync:\n  managed: ['../escape']\n";
        assert!(PackageManifest::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_path_not_found() {
        let err = PackageManifest::from_path(Path::new("/nonexistent/x.info.yml")).unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound(_)));
    }

    #[test]
    fn test_from_path_reports_file_on_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.info.yml");
        std::fs::write(&path, "name: [unclosed\n").unwrap();

        let err = PackageManifest::from_path(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidManifest { .. }));
        assert!(err.to_string().contains("broken.info.yml"));
    }

    #[test]
    fn test_roundtrip_keeps_ownership() {
        let manifest = PackageManifest::from_yaml(BLOG_YAML).unwrap();
        let reparsed = PackageManifest::from_yaml(&manifest.to_yaml().unwrap()).unwrap();
        assert_eq!(manifest, reparsed);
    }
}
