//! Installing a package's shipped config into the target store.
//!
//! The installer refuses to install a package whose shipped config already
//! exists in the target. Packages that take part in config ownership are
//! expected to ship config that already exists (it was exported from the
//! site), so [`OwnershipAwareInstaller`] wraps any [`ConfigInstaller`] and
//! lets those packages through.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use cfgsync_extensions::PackageRegistry;
use cfgsync_fs::{ConfigStorage, FileStorage};

use crate::{Error, Result};

/// Default sub-directory for config installed only when its dependencies are met.
pub const OPTIONAL_SUBDIR: &str = "config/optional";

/// Capability interface of a config installer.
pub trait ConfigInstaller {
    /// Install the config shipped by `package`, returning the created names.
    fn install_default_config(&self, package: &str) -> Result<Vec<String>>;

    /// Install optional config whose dependencies are now satisfied.
    fn install_optional_config(&self) -> Result<Vec<String>>;

    /// Fail with [`Error::PreExistingConfig`] when config shipped by
    /// `package` already exists in the target.
    fn check_configuration_to_install(&self, package: &str) -> Result<()>;

    /// Mark whether a synchronization is running. Installs are skipped
    /// while it is.
    fn set_syncing(&self, syncing: bool);

    fn is_syncing(&self) -> bool;
}

/// Installs shipped config from package directories into a config store.
pub struct StorageInstaller<'a> {
    target: &'a dyn ConfigStorage,
    registry: &'a PackageRegistry,
    subdir: String,
    optional_subdir: String,
    syncing: AtomicBool,
}

impl std::fmt::Debug for StorageInstaller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageInstaller")
            .field("subdir", &self.subdir)
            .field("optional_subdir", &self.optional_subdir)
            .field("syncing", &self.is_syncing())
            .finish_non_exhaustive()
    }
}

impl<'a> StorageInstaller<'a> {
    pub fn new(
        target: &'a dyn ConfigStorage,
        registry: &'a PackageRegistry,
        subdir: impl Into<String>,
    ) -> Self {
        Self {
            target,
            registry,
            subdir: subdir.into(),
            optional_subdir: OPTIONAL_SUBDIR.to_string(),
            syncing: AtomicBool::new(false),
        }
    }

    pub fn with_optional_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.optional_subdir = subdir.into();
        self
    }

    fn shipped(&self, package: &str, subdir: &str) -> Result<FileStorage> {
        let package = self.registry.require(package)?;
        Ok(FileStorage::for_collection(
            package.config_dir(subdir),
            self.target.collection(),
        ))
    }

    /// Whether every module and config dependency of an optional record is
    /// present.
    fn dependencies_met(&self, record: &cfgsync_fs::ConfigRecord) -> Result<bool> {
        let declared = crate::dependency::declared_dependencies(record);
        for (kind, names) in &declared {
            for name in names {
                let met = match kind.as_str() {
                    crate::dependency::CONFIG => self.target.exists(name)?,
                    _ => self.registry.get(name).is_some_and(|p| p.enabled),
                };
                if !met {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl ConfigInstaller for StorageInstaller<'_> {
    fn install_default_config(&self, package: &str) -> Result<Vec<String>> {
        if self.is_syncing() {
            tracing::debug!(package, "Skipping config install during synchronization");
            return Ok(Vec::new());
        }

        let files = self.shipped(package, &self.subdir)?;
        let mut installed = Vec::new();
        for name in files.list_all()? {
            if self.target.exists(&name)? {
                continue;
            }
            if let Some(record) = files.read(&name)? {
                self.target.write(&name, &record)?;
                installed.push(name);
            }
        }
        tracing::info!(package, installed = installed.len(), "Installed default config");
        Ok(installed)
    }

    fn install_optional_config(&self) -> Result<Vec<String>> {
        if self.is_syncing() {
            return Ok(Vec::new());
        }

        let mut installed = Vec::new();
        for package in self.registry.iter().filter(|p| p.enabled) {
            let files = FileStorage::for_collection(
                package.config_dir(&self.optional_subdir),
                self.target.collection(),
            );
            for name in files.list_all()? {
                if self.target.exists(&name)? {
                    continue;
                }
                let Some(record) = files.read(&name)? else {
                    continue;
                };
                if self.dependencies_met(&record)? {
                    self.target.write(&name, &record)?;
                    installed.push(name);
                } else {
                    tracing::debug!(name, package = %package.name, "Optional config dependencies not met");
                }
            }
        }
        Ok(installed)
    }

    fn check_configuration_to_install(&self, package: &str) -> Result<()> {
        let files = self.shipped(package, &self.subdir)?;
        let mut existing = Vec::new();
        for name in files.list_all()? {
            if self.target.exists(&name)? {
                existing.push(name);
            }
        }
        if existing.is_empty() {
            Ok(())
        } else {
            Err(Error::PreExistingConfig {
                package: package.to_string(),
                names: existing,
            })
        }
    }

    fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::SeqCst);
    }

    fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }
}

/// Wraps an installer, tolerating pre-existing config for packages that
/// participate in config ownership.
#[derive(Debug)]
pub struct OwnershipAwareInstaller<I> {
    inner: I,
    participants: BTreeSet<String>,
}

impl<I: ConfigInstaller> OwnershipAwareInstaller<I> {
    /// Wrap `inner`, taking the participating packages from `registry`.
    pub fn new(inner: I, registry: &PackageRegistry) -> Self {
        let participants = registry
            .iter()
            .filter(|package| package.participates())
            .map(|package| package.name.clone())
            .collect();
        Self {
            inner,
            participants,
        }
    }

    pub fn with_participants<S: Into<String>>(
        inner: I,
        participants: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            inner,
            participants: participants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: ConfigInstaller> ConfigInstaller for OwnershipAwareInstaller<I> {
    fn install_default_config(&self, package: &str) -> Result<Vec<String>> {
        self.inner.install_default_config(package)
    }

    fn install_optional_config(&self) -> Result<Vec<String>> {
        self.inner.install_optional_config()
    }

    fn check_configuration_to_install(&self, package: &str) -> Result<()> {
        match self.inner.check_configuration_to_install(package) {
            Err(Error::PreExistingConfig { names, .. }) if self.participants.contains(package) => {
                tracing::debug!(package, existing = names.len(), "Allowing pre-existing owned config");
                Ok(())
            }
            other => other,
        }
    }

    fn set_syncing(&self, syncing: bool) {
        self.inner.set_syncing(syncing)
    }

    fn is_syncing(&self) -> bool {
        self.inner.is_syncing()
    }
}
