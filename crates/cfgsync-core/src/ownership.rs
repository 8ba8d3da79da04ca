//! Config ownership and the merged source view.
//!
//! Every participating package contributes the config it owns to one
//! virtual source store layered over the target store. Names a package does
//! not own fall through to the target, so only owned config ever differs
//! from it. While layering, each claimed name is mapped to its package and a
//! second claim on the same name aborts the whole build.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use cfgsync_extensions::OwnershipLists;
use cfgsync_fs::{ConfigRecord, ConfigStorage};

use crate::{Error, Result};

/// Name to owning package, and package to owned names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipMap {
    owners: BTreeMap<String, String>,
    by_package: BTreeMap<String, BTreeSet<String>>,
}

impl OwnershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The package owning `name`.
    pub fn owner_of(&self, name: &str) -> Option<&str> {
        self.owners.get(name).map(String::as_str)
    }

    /// Names owned by `package`, sorted.
    pub fn names_of(&self, package: &str) -> impl Iterator<Item = &str> {
        self.by_package
            .get(package)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Record that `package` owns `name`.
    ///
    /// Fails when another package already owns it. Re-mapping a name to
    /// its current owner is a no-op.
    pub fn insert(&mut self, name: &str, package: &str) -> Result<()> {
        match self.owners.get(name) {
            Some(owner) if owner == package => Ok(()),
            Some(owner) => Err(Error::OwnershipConflict {
                name: name.to_string(),
                package: package.to_string(),
                other: owner.clone(),
            }),
            None => {
                self.owners.insert(name.to_string(), package.to_string());
                self.by_package
                    .entry(package.to_string())
                    .or_default()
                    .insert(name.to_string());
                Ok(())
            }
        }
    }

    /// `(name, package)` pairs sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owners.iter().map(|(n, p)| (n.as_str(), p.as_str()))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// A value staged in the source view.
#[derive(Debug, Clone, PartialEq)]
pub enum Staged {
    /// Replaces whatever the target holds.
    Replace(ConfigRecord),
    /// Marks the name for deletion.
    Tombstone,
}

/// The merged source store: staged values over a target store.
pub struct SourceView<'t> {
    target: &'t dyn ConfigStorage,
    staged: RwLock<BTreeMap<String, Staged>>,
    ownership: OwnershipMap,
}

impl std::fmt::Debug for SourceView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceView")
            .field("collection", &self.target.collection())
            .field("staged", &*self.staged_read())
            .field("ownership", &self.ownership)
            .finish()
    }
}

impl<'t> SourceView<'t> {
    /// An empty view deferring everything to `target`.
    pub fn new(target: &'t dyn ConfigStorage) -> Self {
        Self {
            target,
            staged: RwLock::new(BTreeMap::new()),
            ownership: OwnershipMap::new(),
        }
    }

    pub fn ownership(&self) -> &OwnershipMap {
        &self.ownership
    }

    pub fn target(&self) -> &'t dyn ConfigStorage {
        self.target
    }

    /// The staged value for `name`, if any.
    pub fn staged(&self, name: &str) -> Option<Staged> {
        self.staged_read().get(name).cloned()
    }

    pub fn is_tombstone(&self, name: &str) -> bool {
        matches!(self.staged_read().get(name), Some(Staged::Tombstone))
    }

    /// Names marked for deletion, sorted.
    pub fn tombstones(&self) -> BTreeSet<String> {
        self.staged_read()
            .iter()
            .filter(|(_, staged)| matches!(staged, Staged::Tombstone))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of staged values, tombstones included.
    pub fn staged_len(&self) -> usize {
        self.staged_read().len()
    }

    fn stage(&self, name: &str, value: Staged) {
        self.staged
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    fn staged_read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Staged>> {
        self.staged.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStorage for SourceView<'_> {
    fn read(&self, name: &str) -> cfgsync_fs::Result<Option<ConfigRecord>> {
        match self.staged(name) {
            Some(Staged::Replace(record)) => Ok(Some(record)),
            Some(Staged::Tombstone) => Ok(None),
            None => self.target.read(name),
        }
    }

    fn write(&self, name: &str, record: &ConfigRecord) -> cfgsync_fs::Result<()> {
        cfgsync_fs::validate_config_name(name)?;
        self.stage(name, Staged::Replace(record.clone()));
        Ok(())
    }

    fn exists(&self, name: &str) -> cfgsync_fs::Result<bool> {
        match self.staged_read().get(name) {
            Some(Staged::Replace(_)) => Ok(true),
            Some(Staged::Tombstone) => Ok(false),
            None => self.target.exists(name),
        }
    }

    fn list_all(&self) -> cfgsync_fs::Result<BTreeSet<String>> {
        let mut names = self.target.list_all()?;
        for (name, staged) in self.staged_read().iter() {
            match staged {
                Staged::Replace(_) => {
                    names.insert(name.clone());
                }
                Staged::Tombstone => {
                    names.remove(name);
                }
            }
        }
        Ok(names)
    }

    fn delete(&self, name: &str) -> cfgsync_fs::Result<bool> {
        let existed = self.exists(name)?;
        self.stage(name, Staged::Tombstone);
        Ok(existed)
    }

    fn collection(&self) -> &str {
        self.target.collection()
    }
}

/// One package's contribution to the source view.
pub struct SourcePackage {
    pub name: String,
    pub lists: OwnershipLists,
    /// The package's config directory.
    pub files: Box<dyn ConfigStorage>,
}

impl SourcePackage {
    pub fn new(
        name: impl Into<String>,
        lists: OwnershipLists,
        files: impl ConfigStorage + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            lists,
            files: Box::new(files),
        }
    }
}

impl std::fmt::Debug for SourcePackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePackage")
            .field("name", &self.name)
            .field("lists", &self.lists)
            .finish_non_exhaustive()
    }
}

/// Layer `packages` over `target`, in the given order.
///
/// Owned names present in a package's files are staged, except unmanaged
/// names that already exist (unless `force_unmanaged`), which are mapped
/// but left to the target. Delete claims are staged as tombstones. Any
/// second claim on a name fails the whole build.
pub fn build_source_view<'t>(
    target: &'t dyn ConfigStorage,
    packages: &[SourcePackage],
    force_unmanaged: bool,
) -> Result<SourceView<'t>> {
    let mut view = SourceView::new(target);

    for package in packages {
        let importable = package.lists.importable();
        // Checked on the lists alone, whether or not the files are shipped
        if let Some(name) = importable.intersection(&package.lists.delete).next() {
            return Err(Error::ProvideDeleteConflict {
                name: name.clone(),
                package: package.name.clone(),
            });
        }
        let available = package.files.list_all()?;

        for name in importable.intersection(&available) {
            if let Some(other) = view.ownership.owner_of(name) {
                return Err(Error::OwnershipConflict {
                    name: name.clone(),
                    package: package.name.clone(),
                    other: other.to_string(),
                });
            }

            let create_only = !force_unmanaged && package.lists.is_unmanaged(name);
            if create_only && view.exists(name)? {
                tracing::debug!(name = %name, package = %package.name, "Skip existing unmanaged config");
            } else {
                match package.files.read(name)? {
                    Some(record) => {
                        tracing::debug!(name = %name, package = %package.name, "Stage config");
                        view.stage(name, Staged::Replace(record));
                    }
                    None => {
                        tracing::warn!(name = %name, package = %package.name, "Listed config vanished while staging");
                    }
                }
            }
            view.ownership.insert(name, &package.name)?;
        }

        for name in &package.lists.delete {
            match view.ownership.owner_of(name) {
                Some(other) => {
                    return Err(Error::OwnershipConflict {
                        name: name.clone(),
                        package: package.name.clone(),
                        other: other.to_string(),
                    });
                }
                None => {
                    tracing::debug!(name = %name, package = %package.name, "Stage deletion");
                    view.stage(name, Staged::Tombstone);
                    view.ownership.insert(name, &package.name)?;
                }
            }
        }
    }

    tracing::info!(
        packages = packages.len(),
        owned = view.ownership.len(),
        staged = view.staged_len(),
        "Built source view"
    );
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgsync_fs::MemoryStorage;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ConfigRecord {
        value.as_object().cloned().unwrap()
    }

    fn lists(managed: &[&str], unmanaged: &[&str], delete: &[&str]) -> OwnershipLists {
        let set = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        OwnershipLists {
            managed: set(managed),
            unmanaged: set(unmanaged),
            implicit: BTreeSet::new(),
            delete: set(delete),
        }
    }

    fn files(names: &[&str]) -> MemoryStorage {
        MemoryStorage::from_records(names.iter().map(|n| (*n, record(json!({"from": "package"})))))
    }

    #[test]
    fn test_ownership_map_rejects_second_owner() {
        let mut map = OwnershipMap::new();
        map.insert("a.b", "one").unwrap();
        map.insert("a.b", "one").unwrap();

        let err = map.insert("a.b", "two").unwrap_err();
        assert!(matches!(
            err,
            Error::OwnershipConflict { ref package, ref other, .. } if package == "two" && other == "one"
        ));
        assert_eq!(map.names_of("one").collect::<Vec<_>>(), vec!["a.b"]);
    }

    #[test]
    fn test_unowned_files_are_ignored() {
        let target = MemoryStorage::new();
        let packages = [SourcePackage::new(
            "blog",
            lists(&["blog.settings"], &[], &[]),
            files(&["blog.settings", "blog.extra"]),
        )];

        let view = build_source_view(&target, &packages, false).unwrap();

        assert_eq!(
            view.list_all().unwrap(),
            BTreeSet::from(["blog.settings".to_string()])
        );
        assert_eq!(view.ownership().owner_of("blog.settings"), Some("blog"));
        assert_eq!(view.ownership().owner_of("blog.extra"), None);
    }

    #[test]
    fn test_listed_names_missing_from_files_are_not_mapped() {
        let target = MemoryStorage::new();
        let packages = [SourcePackage::new("blog", lists(&["blog.gone"], &[], &[]), files(&[]))];

        let view = build_source_view(&target, &packages, false).unwrap();

        assert!(view.ownership().is_empty());
    }

    #[test]
    fn test_view_defers_unstaged_names_to_target() {
        let target = MemoryStorage::from_records([("system.site", record(json!({"name": "Site"})))]);
        let view = build_source_view(&target, &[], false).unwrap();

        assert_eq!(
            view.read("system.site").unwrap(),
            Some(record(json!({"name": "Site"})))
        );
        assert!(view.exists("system.site").unwrap());
    }

    #[test]
    fn test_existing_unmanaged_config_is_mapped_but_not_staged() {
        let target = MemoryStorage::from_records([("blog.settings", record(json!({"from": "target"})))]);
        let packages = [SourcePackage::new(
            "blog",
            lists(&[], &["blog.settings"], &[]),
            files(&["blog.settings"]),
        )];

        let view = build_source_view(&target, &packages, false).unwrap();

        assert_eq!(view.staged("blog.settings"), None);
        assert_eq!(view.ownership().owner_of("blog.settings"), Some("blog"));
        assert_eq!(
            view.read("blog.settings").unwrap(),
            Some(record(json!({"from": "target"})))
        );
    }

    #[test]
    fn test_force_unmanaged_stages_existing_config() {
        let target = MemoryStorage::from_records([("blog.settings", record(json!({"from": "target"})))]);
        let packages = [SourcePackage::new(
            "blog",
            lists(&[], &["blog.settings"], &[]),
            files(&["blog.settings"]),
        )];

        let view = build_source_view(&target, &packages, true).unwrap();

        assert_eq!(
            view.read("blog.settings").unwrap(),
            Some(record(json!({"from": "package"})))
        );
    }

    #[test]
    fn test_deletion_claims_stage_tombstones() {
        let target = MemoryStorage::from_records([
            ("views.view.frontpage", record(json!({}))),
            ("system.site", record(json!({}))),
        ]);
        let packages = [SourcePackage::new(
            "blog",
            lists(&[], &[], &["views.view.frontpage"]),
            files(&[]),
        )];

        let view = build_source_view(&target, &packages, false).unwrap();

        assert!(view.is_tombstone("views.view.frontpage"));
        assert!(!view.exists("views.view.frontpage").unwrap());
        assert_eq!(view.read("views.view.frontpage").unwrap(), None);
        assert_eq!(
            view.list_all().unwrap(),
            BTreeSet::from(["system.site".to_string()])
        );
        assert_eq!(view.ownership().owner_of("views.view.frontpage"), Some("blog"));
    }

    #[test]
    fn test_two_packages_claiming_one_name_conflict() {
        let target = MemoryStorage::new();
        let packages = [
            SourcePackage::new("a", lists(&["foo.bar"], &[], &[]), files(&["foo.bar"])),
            SourcePackage::new("b", lists(&["foo.bar"], &[], &[]), files(&["foo.bar"])),
        ];

        let err = build_source_view(&target, &packages, false).unwrap_err();

        match err {
            Error::OwnershipConflict { name, package, other } => {
                assert_eq!(name, "foo.bar");
                assert_eq!(package, "b");
                assert_eq!(other, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_providing_and_deleting_one_name_conflicts() {
        let target = MemoryStorage::new();
        let packages = [SourcePackage::new("a", lists(&["x.y"], &[], &["x.y"]), files(&["x.y"]))];

        let err = build_source_view(&target, &packages, false).unwrap_err();

        assert!(matches!(err, Error::ProvideDeleteConflict { ref name, ref package } if name == "x.y" && package == "a"));
    }

    #[rstest]
    #[case(lists(&["x.y"], &[], &["x.y"]))]
    #[case(lists(&[], &["x.y"], &["x.y"]))]
    fn test_provide_and_delete_conflict_without_shipped_file(#[case] claims: OwnershipLists) {
        let target = MemoryStorage::from_records([("x.y", record(json!({"a": 1})))]);
        let packages = [SourcePackage::new("a", claims, files(&[]))];

        let err = build_source_view(&target, &packages, false).unwrap_err();

        assert!(matches!(err, Error::ProvideDeleteConflict { ref name, .. } if name == "x.y"));
        assert!(err.is_ownership_conflict());
        assert!(target.exists("x.y").unwrap());
    }

    #[test]
    fn test_deleting_config_owned_elsewhere_conflicts() {
        let target = MemoryStorage::new();
        let packages = [
            SourcePackage::new("a", lists(&["x.y"], &[], &[]), files(&["x.y"])),
            SourcePackage::new("b", lists(&[], &[], &["x.y"]), files(&[])),
        ];

        let err = build_source_view(&target, &packages, false).unwrap_err();

        assert!(matches!(err, Error::OwnershipConflict { ref other, .. } if other == "a"));
    }

    #[test]
    fn test_writes_stage_without_touching_target() {
        let target = MemoryStorage::new();
        let view = SourceView::new(&target);

        view.write("a.b", &record(json!({"v": 1}))).unwrap();

        assert!(view.exists("a.b").unwrap());
        assert!(target.is_empty());
        assert!(view.delete("a.b").unwrap());
        assert!(view.is_tombstone("a.b"));
    }
}
