//! Ordered changes that bring a target store in line with a source view.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cfgsync_fs::{ConfigRecord, ConfigStorage};

use crate::dependency::{CONFIG, Dependencies, DependencyResolver, ResolveSession};
use crate::differ::ConfigDiffer;
use crate::ownership::SourceView;
use crate::{Error, Result};

/// Kind of a change operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One change to one config item.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeOperation {
    pub collection: String,
    pub kind: ChangeKind,
    pub name: String,
    /// The record to write; `None` for deletions.
    pub record: Option<ConfigRecord>,
    /// The package owning the item, when one does.
    pub package: Option<String>,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)?;
        if let Some(package) = &self.package {
            write!(f, " ({package})")?;
        }
        Ok(())
    }
}

/// Operations in apply order: deletions first, dependents before what they
/// depend on; then creations and updates, dependencies first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changelist {
    operations: Vec<ChangeOperation>,
}

impl Changelist {
    pub fn new(operations: Vec<ChangeOperation>) -> Self {
        Self { operations }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeOperation> {
        self.operations.iter()
    }

    pub fn operations(&self) -> &[ChangeOperation] {
        &self.operations
    }

    /// Names of operations of `kind`, in apply order.
    pub fn names(&self, kind: ChangeKind) -> Vec<&str> {
        self.operations
            .iter()
            .filter(|op| op.kind == kind)
            .map(|op| op.name.as_str())
            .collect()
    }

    /// Position of the operation on `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.operations.iter().position(|op| op.name == name)
    }
}

impl IntoIterator for Changelist {
    type Item = ChangeOperation;
    type IntoIter = std::vec::IntoIter<ChangeOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl<'a> IntoIterator for &'a Changelist {
    type Item = &'a ChangeOperation;
    type IntoIter = std::slice::Iter<'a, ChangeOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

/// Compares a source view against a target store.
#[derive(Debug, Clone, Default)]
pub struct ChangelistBuilder {
    differ: ConfigDiffer,
}

impl ChangelistBuilder {
    pub fn new(differ: ConfigDiffer) -> Self {
        Self { differ }
    }

    pub fn differ(&self) -> &ConfigDiffer {
        &self.differ
    }

    /// Build the ordered changelist.
    ///
    /// Names in both stores are updated when they differ, source-only names
    /// are created and target-only names (tombstoned in the view) deleted.
    /// Fails when pending changes depend on each other in a cycle.
    pub fn build(
        &self,
        source: &SourceView<'_>,
        target: &dyn ConfigStorage,
    ) -> Result<Changelist> {
        let source_names = source.list_all()?;
        let target_names = target.list_all()?;

        let mut writes: BTreeMap<String, (ChangeKind, ConfigRecord)> = BTreeMap::new();
        for name in &source_names {
            let Some(record) = source.read(name)? else {
                continue;
            };
            if target_names.contains(name) {
                let current = target.read(name)?.unwrap_or_default();
                if !self.differ.same_named(name, &record, &current) {
                    writes.insert(name.clone(), (ChangeKind::Update, record));
                }
            } else {
                writes.insert(name.clone(), (ChangeKind::Create, record));
            }
        }
        let deletes: BTreeSet<String> = target_names.difference(&source_names).cloned().collect();

        let write_names: BTreeSet<String> = writes.keys().cloned().collect();
        let write_edges = config_edges(source, &write_names)?;
        let write_order = topological_order(&write_names, &write_edges)?;

        // A dependent goes first, so each item waits on its dependents
        let delete_edges = invert(&config_edges(target, &deletes)?);
        let delete_order = topological_order(&deletes, &delete_edges)?;

        let collection = source.collection().to_string();
        let owner = |name: &str| source.ownership().owner_of(name).map(str::to_string);

        let mut operations = Vec::with_capacity(delete_order.len() + write_order.len());
        for name in delete_order {
            operations.push(ChangeOperation {
                collection: collection.clone(),
                kind: ChangeKind::Delete,
                package: owner(&name),
                name,
                record: None,
            });
        }
        for name in write_order {
            let Some((kind, record)) = writes.remove(&name) else {
                continue;
            };
            operations.push(ChangeOperation {
                collection: collection.clone(),
                kind,
                package: owner(&name),
                name,
                record: Some(record),
            });
        }

        tracing::info!(
            deletes = deletes.len(),
            writes = write_names.len(),
            "Built changelist"
        );
        Ok(Changelist::new(operations))
    }
}

/// For each candidate, the other candidates it transitively depends on
/// through config dependencies in `store`.
fn config_edges(
    store: &dyn ConfigStorage,
    candidates: &BTreeSet<String>,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let resolver = DependencyResolver::new(store);
    let mut session: ResolveSession<Dependencies> = ResolveSession::new(None);
    let mut edges = BTreeMap::new();

    for name in candidates {
        let dependencies = resolver.forward(name, &mut session)?;
        let on: BTreeSet<String> = dependencies
            .get(CONFIG)
            .into_iter()
            .flatten()
            .filter(|dependency| *dependency != name && candidates.contains(*dependency))
            .cloned()
            .collect();
        edges.insert(name.clone(), on);
    }
    Ok(edges)
}

fn invert(edges: &BTreeMap<String, BTreeSet<String>>) -> BTreeMap<String, BTreeSet<String>> {
    let mut inverted: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (node, dependencies) in edges {
        inverted.entry(node.clone()).or_default();
        for dependency in dependencies {
            inverted
                .entry(dependency.clone())
                .or_default()
                .insert(node.clone());
        }
    }
    inverted
}

/// Order `nodes` so each comes after everything it depends on, breaking
/// ties by name.
fn topological_order(
    nodes: &BTreeSet<String>,
    depends_on: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<String>> {
    let mut remaining: BTreeMap<&str, usize> = nodes
        .iter()
        .map(|node| {
            let count = depends_on.get(node).map_or(0, BTreeSet::len);
            (node.as_str(), count)
        })
        .collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (node, dependencies) in depends_on {
        for dependency in dependencies {
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(node.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(node) = ready.pop_first() {
        remaining.remove(node);
        order.push(node.to_string());
        for dependent in dependents.get(node).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if !remaining.is_empty() {
        let participants: Vec<String> = remaining.keys().map(|node| node.to_string()).collect();
        tracing::warn!(?participants, "Dependency cycle among pending changes");
        return Err(Error::CyclicDependency { participants });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edges(pairs: &[(&str, Vec<&str>)]) -> BTreeMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(node, deps)| {
                (
                    node.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    fn nodes(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_independent_nodes_are_ordered_by_name() {
        let order = topological_order(&nodes(&["c", "a", "b"]), &BTreeMap::new()).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let graph = edges(&[("a", vec!["z"]), ("z", vec![]), ("m", vec!["a"])]);
        let order = topological_order(&nodes(&["a", "m", "z"]), &graph).unwrap();
        assert_eq!(order, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_cycles_are_reported() {
        let graph = edges(&[("a", vec!["b"]), ("b", vec!["a"]), ("c", vec![])]);
        let err = topological_order(&nodes(&["a", "b", "c"]), &graph).unwrap_err();

        match err {
            Error::CyclicDependency { participants } => assert_eq!(participants, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invert_reverses_every_edge() {
        let inverted = invert(&edges(&[("a", vec!["b"]), ("b", vec![])]));
        assert_eq!(inverted, edges(&[("a", vec![]), ("b", vec!["a"])]));
    }

    #[test]
    fn test_display_includes_owner() {
        let op = ChangeOperation {
            collection: String::new(),
            kind: ChangeKind::Update,
            name: "system.site".to_string(),
            record: None,
            package: Some("blog".to_string()),
        };
        assert_eq!(op.to_string(), "update system.site (blog)");
    }
}
