//! Package discovery.
//!
//! [`PackageDiscovery`] is the seam the sync engine enumerates packages
//! through. [`DirectoryDiscovery`] implements it over one or more package
//! roots laid out as `<root>/<name>/<name>.info.yml`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::manifest::PackageManifest;
use crate::package::{Package, manifest_path, validate_machine_name};

/// Source of installed packages.
pub trait PackageDiscovery: Send + Sync {
    /// Installed packages in processing order: modules and profiles first,
    /// then themes, heavier first within a kind, ties by name.
    ///
    /// Disabled packages are only listed when `include_disabled` is set.
    fn packages(&self, include_disabled: bool) -> Result<Vec<Package>>;

    /// Forget any cached manifest so the next call re-reads it.
    fn invalidate(&self, _package: &str) {}
}

/// Parsed manifests keyed by file path.
///
/// Manifests are read once and shared; the manifest writer invalidates an
/// entry after editing the file.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: Mutex<HashMap<PathBuf, Arc<PackageManifest>>>,
}

impl ManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached manifest for `path`, parsing it on first use.
    pub fn load(&self, path: &Path) -> Result<Arc<PackageManifest>> {
        if let Some(manifest) = self.lock().get(path) {
            return Ok(Arc::clone(manifest));
        }

        let manifest = Arc::new(PackageManifest::from_path(path)?);
        self.lock().insert(path.to_path_buf(), Arc::clone(&manifest));
        Ok(manifest)
    }

    pub fn invalidate(&self, path: &Path) {
        self.lock().remove(path);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<PackageManifest>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Discovers packages in directories on disk.
#[derive(Debug, Default)]
pub struct DirectoryDiscovery {
    roots: Vec<PathBuf>,
    /// Enabled machine names; `None` means every package is enabled.
    enabled: Option<BTreeSet<String>>,
    cache: ManifestCache,
}

impl DirectoryDiscovery {
    /// Discover packages below a single root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ..Self::default()
        }
    }

    /// Add another root. Earlier roots win when a machine name repeats.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Restrict the enabled packages to `names`; all others are disabled.
    pub fn with_enabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn is_enabled(&self, name: &str) -> bool {
        self.enabled
            .as_ref()
            .is_none_or(|enabled| enabled.contains(name))
    }

    fn scan_root(
        &self,
        root: &Path,
        seen: &mut BTreeSet<String>,
        out: &mut Vec<Package>,
    ) -> Result<()> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(root = %root.display(), "Package root does not exist");
                return Ok(());
            }
            Err(e) => return Err(cfgsync_fs::Error::io(root, e).into()),
        };

        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| cfgsync_fs::Error::io(root, e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();

        for dir in dirs {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if validate_machine_name(&name).is_err() {
                continue;
            }
            let manifest_file = manifest_path(&dir, &name);
            if !manifest_file.is_file() {
                continue;
            }
            if !seen.insert(name.clone()) {
                tracing::warn!(package = %name, path = %dir.display(), "Duplicate package ignored");
                continue;
            }

            let manifest = self.cache.load(&manifest_file)?;
            let enabled = self.is_enabled(&name);
            out.push(Package::new(name, dir, manifest)?.with_enabled(enabled));
        }

        Ok(())
    }
}

impl PackageDiscovery for DirectoryDiscovery {
    fn packages(&self, include_disabled: bool) -> Result<Vec<Package>> {
        let mut seen = BTreeSet::new();
        let mut packages = Vec::new();
        for root in &self.roots {
            self.scan_root(root, &mut seen, &mut packages)?;
        }

        if !include_disabled {
            packages.retain(|package| package.enabled);
        }
        packages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        tracing::debug!(count = packages.len(), include_disabled, "Discovered packages");
        Ok(packages)
    }

    fn invalidate(&self, package: &str) {
        for root in &self.roots {
            let dir = root.join(package);
            self.cache.invalidate(&manifest_path(&dir, package));
        }
    }
}
