//! Name to package lookup over every installed package.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::package::{Package, PackageKind};

/// Answers which kind of package owns a name.
///
/// The dependency resolver uses this to decide whether a config item's
/// provider is recorded as a module or a theme dependency.
pub trait PackageLookup: Send + Sync {
    /// Kind of the named package, or `None` when it is not installed.
    fn kind_of(&self, name: &str) -> Option<PackageKind>;

    /// Whether the named package is a theme.
    fn is_theme(&self, name: &str) -> bool {
        self.kind_of(name) == Some(PackageKind::Theme)
    }
}

impl PackageLookup for HashMap<String, PackageKind> {
    fn kind_of(&self, name: &str) -> Option<PackageKind> {
        self.get(name).copied()
    }
}

impl PackageLookup for BTreeMap<String, PackageKind> {
    fn kind_of(&self, name: &str) -> Option<PackageKind> {
        self.get(name).copied()
    }
}

/// Registry of installed packages, enabled or not.
#[derive(Debug, Clone, Default)]
pub struct PackageRegistry {
    packages: BTreeMap<String, Package>,
}

impl PackageRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from discovered packages.
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut registry = Self::new();
        for package in packages {
            registry.register(package);
        }
        registry
    }

    /// Register a package, replacing any with the same name.
    pub fn register(&mut self, package: Package) {
        self.packages.insert(package.name.clone(), package);
    }

    /// Look up a package by machine name.
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Look up a package, failing when it is not installed.
    pub fn require(&self, name: &str) -> Result<&Package> {
        self.get(name)
            .ok_or_else(|| Error::UnknownPackage(name.to_string()))
    }

    /// Check if a package is installed.
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Installed machine names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageLookup for PackageRegistry {
    fn kind_of(&self, name: &str) -> Option<PackageKind> {
        self.packages.get(name).map(|package| package.kind)
    }
}
