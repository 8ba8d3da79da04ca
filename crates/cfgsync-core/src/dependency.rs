//! Forward and reverse dependency traversal between config items.
//!
//! A record declares what it needs in its own `dependencies` mapping
//! (`config`, `module`, `theme` lists). On top of that every record depends
//! on the package named by its namespace, unless that is the core namespace.
//!
//! Traversals are memoized per [`ResolveSession`], which lives for one
//! top-level query only. A shared depth counter bounds recursion: it is
//! raised before descending into a record's config dependencies and lowered
//! afterwards, and descent stops once it reaches the limit.
//!
//! A name reached again while its own traversal is still running contributes
//! nothing at that point. Results cut short that way are not memoized, since
//! they lack whatever the interrupted ancestor goes on to collect.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use cfgsync_extensions::{PackageLookup, PackageRegistry};
use cfgsync_fs::{ConfigRecord, ConfigStorage};
use serde_json::Value;

use crate::Result;

/// Dependency type of config items.
pub const CONFIG: &str = "config";
/// Dependency type of modules and profiles.
pub const MODULE: &str = "module";
/// Dependency type of themes.
pub const THEME: &str = "theme";

/// Default namespace of the host, never recorded as a dependency.
pub const CORE_NAMESPACE: &str = "core";

/// Dependencies keyed by dependency type.
pub type Dependencies = BTreeMap<String, BTreeSet<String>>;

/// Sorted dependency lists keyed by type, with empty types removed.
pub type DependencyListing = BTreeMap<String, Vec<String>>;

/// Memo and depth state of one top-level query.
#[derive(Debug)]
pub struct ResolveSession<T> {
    depth: usize,
    limit: Option<usize>,
    checked: HashMap<String, T>,
    in_progress: HashSet<String>,
    /// In-progress names reached again, in the order they were hit.
    cycle_hits: Vec<String>,
}

impl<T: Clone> ResolveSession<T> {
    /// A fresh session. A limit of `None` or `Some(0)` is unlimited.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            depth: 0,
            limit: limit.filter(|limit| *limit > 0),
            checked: HashMap::new(),
            in_progress: HashSet::new(),
            cycle_hits: Vec::new(),
        }
    }

    /// Enter `name`, returning the cycle-hit mark to finish it with, or
    /// `None` when `name` is already being traversed.
    fn enter(&mut self, name: &str) -> Option<usize> {
        if self.in_progress.insert(name.to_string()) {
            Some(self.cycle_hits.len())
        } else {
            self.cycle_hits.push(name.to_string());
            None
        }
    }

    /// Leave `name`, memoizing `result` unless a cycle back to a name still
    /// in progress above it cut the traversal short.
    fn finish(&mut self, name: &str, mark: usize, result: &T) {
        self.in_progress.remove(name);
        let hits = self.cycle_hits.split_off(mark);
        let open: Vec<String> = hits.into_iter().filter(|hit| hit != name).collect();
        if open.is_empty() {
            self.checked.insert(name.to_string(), result.clone());
        } else {
            self.cycle_hits.extend(open);
        }
    }

    fn may_descend(&self) -> bool {
        self.limit.is_none_or(|limit| self.depth < limit)
    }

    fn cached(&self, name: &str) -> Option<T> {
        self.checked.get(name).cloned()
    }

    /// Number of memoized entries.
    pub fn len(&self) -> usize {
        self.checked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checked.is_empty()
    }
}

/// Names of the config items that declare each item as a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseIndex {
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the declared config dependencies of every record in `store`.
    pub fn from_storage(store: &dyn ConfigStorage) -> Result<Self> {
        let mut index = Self::new();
        for name in store.list_all()? {
            let Some(record) = store.read(&name)? else {
                continue;
            };
            if let Some(configs) = declared_dependencies(&record).get(CONFIG) {
                for dependency in configs {
                    index.insert(&name, dependency);
                }
            }
        }
        Ok(index)
    }

    /// Record that `dependent` declares `dependency`.
    pub fn insert(&mut self, dependent: &str, dependency: &str) {
        self.dependents
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
    }

    /// Items declaring `name` directly.
    pub fn direct_dependents(&self, name: &str) -> BTreeSet<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }
}

/// The `dependencies` mapping of a record, deduplicated.
///
/// A missing mapping, and any type whose value is not a list, count as no
/// dependencies. Non-string list items are skipped.
pub fn declared_dependencies(record: &ConfigRecord) -> Dependencies {
    let mut dependencies = Dependencies::new();
    let Some(Value::Object(declared)) = record.get("dependencies") else {
        return dependencies;
    };

    for (dependency_type, value) in declared {
        let Value::Array(items) = value else {
            continue;
        };
        let names: BTreeSet<String> = items
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if !names.is_empty() {
            dependencies.insert(dependency_type.clone(), names);
        }
    }
    dependencies
}

fn merge_into(target: &mut Dependencies, source: Dependencies) {
    for (dependency_type, names) in source {
        target.entry(dependency_type).or_default().extend(names);
    }
}

/// Sort each type, drop excluded names and empty types.
pub fn sort_and_filter(dependencies: Dependencies, exclude: &Dependencies) -> DependencyListing {
    dependencies
        .into_iter()
        .filter_map(|(dependency_type, names)| {
            let excluded = exclude.get(&dependency_type);
            let kept: Vec<String> = names
                .into_iter()
                .filter(|name| !name.is_empty())
                .filter(|name| !excluded.is_some_and(|excluded| excluded.contains(name)))
                .collect();
            (!kept.is_empty()).then_some((dependency_type, kept))
        })
        .collect()
}

/// Options for [`DependencyResolver::package_dependencies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyQuery {
    /// Leave out required packages and the config they already provide.
    pub exclude_provided: bool,
    /// Keep the unmanaged config of required packages, which may have
    /// drifted and so still needs exporting.
    pub with_unmanaged: bool,
    pub recursion_limit: Option<usize>,
}

impl Default for DependencyQuery {
    fn default() -> Self {
        Self {
            exclude_provided: false,
            with_unmanaged: true,
            recursion_limit: None,
        }
    }
}

/// Resolves dependencies against a config store.
pub struct DependencyResolver<'a> {
    store: &'a dyn ConfigStorage,
    lookup: Option<&'a dyn PackageLookup>,
    core_namespace: String,
}

impl std::fmt::Debug for DependencyResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("core_namespace", &self.core_namespace)
            .field("has_lookup", &self.lookup.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> DependencyResolver<'a> {
    pub fn new(store: &'a dyn ConfigStorage) -> Self {
        Self {
            store,
            lookup: None,
            core_namespace: CORE_NAMESPACE.to_string(),
        }
    }

    /// Use `lookup` to tell theme providers from module providers.
    pub fn with_lookup(mut self, lookup: &'a dyn PackageLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_core_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.core_namespace = namespace.into();
        self
    }

    /// Transitive dependencies of `name`.
    pub fn dependencies_of(&self, name: &str, limit: Option<usize>) -> Result<Dependencies> {
        let mut session = ResolveSession::new(limit);
        let mut dependencies = self.forward(name, &mut session)?;
        if let Some(configs) = dependencies.get_mut(CONFIG) {
            configs.remove(name);
        }
        Ok(dependencies)
    }

    /// Transitive dependents of `name` according to `index`.
    pub fn dependents_of(
        &self,
        index: &ReverseIndex,
        name: &str,
        limit: Option<usize>,
    ) -> BTreeSet<String> {
        let mut session = ResolveSession::new(limit);
        let mut dependents = reverse(index, name, &mut session);
        dependents.remove(name);
        dependents
    }

    /// Forward traversal within an existing session.
    pub fn forward(
        &self,
        name: &str,
        session: &mut ResolveSession<Dependencies>,
    ) -> Result<Dependencies> {
        if let Some(cached) = session.cached(name) {
            return Ok(cached);
        }
        let Some(mark) = session.enter(name) else {
            return Ok(Dependencies::new());
        };

        let mut dependencies = match self.store.read(name)? {
            Some(record) => declared_dependencies(&record),
            None => Dependencies::new(),
        };

        if let Some(configs) = dependencies.get(CONFIG).cloned() {
            session.depth += 1;
            if session.may_descend() {
                for dependency in &configs {
                    let sub = self.forward(dependency, session)?;
                    merge_into(&mut dependencies, sub);
                }
            }
            session.depth -= 1;
        }

        if let Some((dependency_type, provider)) = self.provider_dependency(name) {
            dependencies
                .entry(dependency_type.to_string())
                .or_default()
                .insert(provider.to_string());
        }

        session.finish(name, mark, &dependencies);
        Ok(dependencies)
    }

    /// The package a config item implicitly depends on.
    ///
    /// Names without a namespace, and those in the core namespace, have
    /// none.
    fn provider_dependency<'n>(&self, name: &'n str) -> Option<(&'static str, &'n str)> {
        let (provider, _) = name.split_once('.')?;
        if provider.is_empty() || provider == self.core_namespace {
            return None;
        }
        let is_theme = self.lookup.is_some_and(|lookup| lookup.is_theme(provider));
        Some((if is_theme { THEME } else { MODULE }, provider))
    }

    /// Aggregate the dependencies of everything a package exports.
    ///
    /// The package's own config and its own name are left out, as is the
    /// core namespace. With [`DependencyQuery::exclude_provided`] the
    /// packages it requires, and the config they own, are left out too.
    pub fn package_dependencies(
        &self,
        registry: &PackageRegistry,
        package: &str,
        query: &DependencyQuery,
    ) -> Result<DependencyListing> {
        let pkg = registry.require(package)?;
        let own_type = pkg.kind.dependency_type();
        let Some(lists) = pkg.ownership() else {
            return Ok(DependencyListing::new());
        };
        let exportable = lists.exportable();
        if exportable.is_empty() {
            return Ok(DependencyListing::new());
        }

        let mut exclude = Dependencies::new();
        exclude
            .entry(own_type.to_string())
            .or_default()
            .insert(package.to_string());
        exclude.insert(CONFIG.to_string(), exportable.clone());

        if query.exclude_provided {
            for required in pkg.required_packages() {
                if let Some(dependency) = registry.get(&required)
                    && let Some(provided) = dependency.ownership()
                {
                    let mut owned = provided.importable();
                    if query.with_unmanaged {
                        owned.retain(|name| !provided.unmanaged.contains(name));
                    }
                    exclude.entry(CONFIG.to_string()).or_default().extend(owned);
                }
                exclude.entry(own_type.to_string()).or_default().insert(required);
            }
        }

        let mut session = ResolveSession::new(query.recursion_limit);
        let mut dependencies = Dependencies::new();
        for name in &exportable {
            let found = self.forward(name, &mut session)?;
            merge_into(&mut dependencies, found);
        }

        if let Some(modules) = dependencies.get_mut(MODULE) {
            modules.remove(&self.core_namespace);
            modules.remove(package);
        }

        tracing::debug!(package, types = dependencies.len(), "Resolved package dependencies");
        Ok(sort_and_filter(dependencies, &exclude))
    }

    /// Config that depends on what a package exports but is not owned by it.
    pub fn package_suggestions(
        &self,
        registry: &PackageRegistry,
        package: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        let pkg = registry.require(package)?;
        let Some(lists) = pkg.ownership() else {
            return Ok(Vec::new());
        };
        let exportable = lists.exportable();
        if exportable.is_empty() {
            return Ok(Vec::new());
        }

        let index = ReverseIndex::from_storage(self.store)?;
        let mut session = ResolveSession::new(limit);
        let mut dependents = BTreeSet::new();
        for name in &exportable {
            dependents.extend(reverse(&index, name, &mut session));
        }

        Ok(dependents
            .into_iter()
            .filter(|name| !exportable.contains(name))
            .collect())
    }
}

fn reverse(
    index: &ReverseIndex,
    name: &str,
    session: &mut ResolveSession<BTreeSet<String>>,
) -> BTreeSet<String> {
    if let Some(cached) = session.cached(name) {
        return cached;
    }
    let Some(mark) = session.enter(name) else {
        return BTreeSet::new();
    };

    let direct = index.direct_dependents(name);
    let mut dependents = direct.clone();
    if !direct.is_empty() {
        session.depth += 1;
        if session.may_descend() {
            for dependent in &direct {
                dependents.extend(reverse(index, dependent, session));
            }
        }
        session.depth -= 1;
    }

    session.finish(name, mark, &dependents);
    dependents
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgsync_extensions::PackageKind;
    use cfgsync_fs::MemoryStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ConfigRecord {
        value.as_object().cloned().unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_declared_dependencies_skip_non_lists() {
        let r = record(json!({"dependencies": {
            "config": ["a.b", "a.b", "c.d"],
            "module": [],
            "enforced": {"module": ["x"]}
        }}));

        let declared = declared_dependencies(&r);

        assert_eq!(declared.len(), 1);
        assert_eq!(declared[CONFIG], set(&["a.b", "c.d"]));
    }

    #[test]
    fn test_provider_is_an_implied_dependency() {
        let store = MemoryStorage::from_records([("node.type.article", record(json!({})))]);
        let resolver = DependencyResolver::new(&store);

        let deps = resolver.dependencies_of("node.type.article", None).unwrap();

        assert_eq!(deps[MODULE], set(&["node"]));
    }

    #[test]
    fn test_core_provider_is_never_recorded() {
        let store = MemoryStorage::from_records([("core.date_format.long", record(json!({})))]);
        let resolver = DependencyResolver::new(&store);

        assert!(resolver.dependencies_of("core.date_format.long", None).unwrap().is_empty());
    }

    #[test]
    fn test_theme_providers_are_recorded_as_themes() {
        let store = MemoryStorage::from_records([("olivero.settings", record(json!({})))]);
        let lookup: HashMap<String, PackageKind> =
            [("olivero".to_string(), PackageKind::Theme)].into_iter().collect();
        let resolver = DependencyResolver::new(&store).with_lookup(&lookup);

        let deps = resolver.dependencies_of("olivero.settings", None).unwrap();

        assert_eq!(deps.get(THEME), Some(&set(&["olivero"])));
        assert!(!deps.contains_key(MODULE));
    }

    #[test]
    fn test_missing_records_still_get_a_provider() {
        let store = MemoryStorage::new();
        let deps = DependencyResolver::new(&store)
            .dependencies_of("views.view.missing", None)
            .unwrap();
        assert_eq!(deps[MODULE], set(&["views"]));
    }

    #[test]
    fn test_cycles_terminate() {
        let store = MemoryStorage::from_records([
            ("a.one", record(json!({"dependencies": {"config": ["b.two"]}}))),
            ("b.two", record(json!({"dependencies": {"config": ["a.one"]}}))),
        ]);

        let deps = DependencyResolver::new(&store).dependencies_of("a.one", None).unwrap();

        assert_eq!(deps[CONFIG], set(&["b.two"]));
        assert_eq!(deps[MODULE], set(&["a", "b"]));
    }

    #[test]
    fn test_reverse_traversal_follows_dependents() {
        let mut index = ReverseIndex::new();
        index.insert("field.field.node.article.body", "field.storage.node.body");
        index.insert("core.entity_form_display.node.article.default", "field.field.node.article.body");
        let store = MemoryStorage::new();
        let resolver = DependencyResolver::new(&store);

        let dependents = resolver.dependents_of(&index, "field.storage.node.body", None);

        assert_eq!(
            dependents,
            set(&[
                "core.entity_form_display.node.article.default",
                "field.field.node.article.body"
            ])
        );
        assert_eq!(
            resolver.dependents_of(&index, "field.storage.node.body", Some(1)),
            set(&["field.field.node.article.body"])
        );
    }

    #[test]
    fn test_cycle_cut_results_are_not_memoized() {
        let store = MemoryStorage::from_records([
            ("a.p", record(json!({"dependencies": {"config": ["m.m"]}}))),
            ("m.m", record(json!({"dependencies": {"config": ["n.n", "r.r"]}}))),
            ("n.n", record(json!({"dependencies": {"config": ["m.m"]}}))),
            ("r.r", record(json!({}))),
        ]);
        let resolver = DependencyResolver::new(&store);
        let mut session = ResolveSession::new(None);

        resolver.forward("a.p", &mut session).unwrap();
        let through_cycle = resolver.forward("n.n", &mut session).unwrap();

        assert_eq!(through_cycle[CONFIG], set(&["m.m", "n.n", "r.r"]));
    }

    #[test]
    fn test_sessions_with_zero_limit_are_unlimited() {
        let session: ResolveSession<Dependencies> = ResolveSession::new(Some(0));
        assert!(session.may_descend());
        assert!(session.is_empty());
    }

    #[test]
    fn test_sort_and_filter_drops_excluded_and_empty_types() {
        let mut deps = Dependencies::new();
        deps.insert(MODULE.to_string(), set(&["views", "blog", "node"]));
        deps.insert(CONFIG.to_string(), set(&["blog.settings"]));
        let mut exclude = Dependencies::new();
        exclude.insert(MODULE.to_string(), set(&["blog"]));
        exclude.insert(CONFIG.to_string(), set(&["blog.settings"]));

        let listing = sort_and_filter(deps, &exclude);

        assert_eq!(listing.len(), 1);
        assert_eq!(listing[MODULE], vec!["node", "views"]);
    }
}
