//! [`TestSite`] builder for cfgsync test scenarios.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use cfgsync_extensions::DirectoryDiscovery;
use cfgsync_fs::{ConfigStorage, FileStorage};
use tempfile::TempDir;

use crate::record::record;

/// Directory holding packages, relative to the site root.
pub const PACKAGES_DIR: &str = "packages";
/// Directory of the active config store, relative to the site root.
pub const TARGET_DIR: &str = "active";

const INSTALL_SUBDIR: &str = "config/install";

/// A temporary site: packages under `packages/`, the active store under
/// `active/`.
///
/// # Example
///
/// ```rust,no_run
/// use cfgsync_test_utils::TestSite;
///
/// let mut site = TestSite::new();
/// site.package("blog", "module", "cfgsync:\n  managed:\n    - blog.settings\n");
/// site.ship("blog", "blog.settings", "per_page: 10");
/// site.activate("blog.settings", "per_page: 20");
/// site.assert_shipped_contains("blog", "blog.settings", "per_page: 10");
/// ```
pub struct TestSite {
    temp_dir: TempDir,
    packages: BTreeSet<String>,
    disabled: BTreeSet<String>,
}

impl Default for TestSite {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSite {
    /// Create an empty site.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            packages: BTreeSet::new(),
            disabled: BTreeSet::new(),
        }
    }

    /// Root of the site.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root().join(PACKAGES_DIR)
    }

    /// Root directory of a package.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(name)
    }

    /// Path of a package's manifest.
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(format!("{name}.info.yml"))
    }

    /// Write a package manifest with the given label-less body.
    ///
    /// `name` and `type` are filled in; `body` is appended verbatim.
    pub fn package(&mut self, name: &str, kind: &str, body: &str) -> PathBuf {
        let content = format!("name: {name}\ntype: {kind}\n{body}");
        self.package_raw(name, &content)
    }

    /// Write a package manifest verbatim.
    pub fn package_raw(&mut self, name: &str, content: &str) -> PathBuf {
        let path = self.manifest_path(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        self.packages.insert(name.to_string());
        path
    }

    /// Mark a package as installed but disabled.
    pub fn disable(&mut self, name: &str) {
        self.disabled.insert(name.to_string());
    }

    /// Ship a config record inside a package's install directory.
    pub fn ship(&self, package: &str, name: &str, yaml: &str) {
        self.shipped(package).write(name, &record(yaml)).unwrap();
    }

    /// Put a record into the active store.
    pub fn activate(&self, name: &str, yaml: &str) {
        self.target().write(name, &record(yaml)).unwrap();
    }

    /// The active config store.
    pub fn target(&self) -> FileStorage {
        FileStorage::new(self.root().join(TARGET_DIR))
    }

    /// The install directory of a package as a store.
    pub fn shipped(&self, package: &str) -> FileStorage {
        FileStorage::new(self.package_dir(package).join(INSTALL_SUBDIR))
    }

    /// Discovery over the site's packages, honouring [`disable`](Self::disable).
    pub fn discovery(&self) -> DirectoryDiscovery {
        let discovery = DirectoryDiscovery::new(self.packages_dir());
        if self.disabled.is_empty() {
            discovery
        } else {
            discovery.with_enabled(self.packages.difference(&self.disabled).cloned())
        }
    }

    /// Raw text of a shipped record, if present.
    pub fn read_shipped(&self, package: &str, name: &str) -> Option<String> {
        fs::read_to_string(self.shipped(package).file_path(name)).ok()
    }

    /// Raw text of a package manifest.
    pub fn read_manifest(&self, package: &str) -> String {
        fs::read_to_string(self.manifest_path(package)).unwrap()
    }

    /// Assert that a shipped record exists and contains `content`.
    ///
    /// # Panics
    /// Panics with a descriptive message otherwise.
    pub fn assert_shipped_contains(&self, package: &str, name: &str, content: &str) {
        let text = self
            .read_shipped(package, name)
            .unwrap_or_else(|| panic!("Expected {name} to be shipped by {package}"));
        assert!(
            text.contains(content),
            "Shipped {name} of {package} does not contain expected content.\nExpected: {content}\nActual: {text}"
        );
    }

    /// Assert that the active store holds `name`.
    pub fn assert_active(&self, name: &str) {
        assert!(
            self.target().exists(name).unwrap(),
            "Expected {name} in the active store"
        );
    }

    /// Assert that the active store does not hold `name`.
    pub fn assert_not_active(&self, name: &str) {
        assert!(
            !self.target().exists(name).unwrap(),
            "Expected {name} NOT to be in the active store"
        );
    }
}
