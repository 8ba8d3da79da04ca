//! End-to-end synchronization scenarios
//!
//! A development site exports its active config into package directories,
//! and other sites import it from there. Each test drives the full stack:
//! discovery, source view, changelist, apply and export.

use std::sync::{Arc, Mutex};

use cfgsync_core::{
    ChangeKind, ChangeOperation, Error, ExportStatus, StorageApplier, SyncOrchestrator,
    SyncSettings, WithDependencies,
};
use cfgsync_fs::{ConfigStorage, FileStorage, SyncLock};
use cfgsync_test_utils::{TestSite, record};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

// =============================================================================
// Test Infrastructure
// =============================================================================

const BLOG: &str = "\
cfgsync:
  managed:
    - blog.type.post
  unmanaged:
    - blog.settings
";

/// A second site sharing the package directories of `site`.
struct OtherSite {
    dir: TempDir,
    target: FileStorage,
}

impl OtherSite {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let target = FileStorage::new(dir.path().join("active"));
        Self { dir, target }
    }

    fn activate(&self, name: &str, yaml: &str) {
        self.target.write(name, &record(yaml)).unwrap();
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_exported_config_imports_into_another_site() {
    let mut dev = TestSite::new();
    dev.package("blog", "module", BLOG);
    dev.activate("blog.type.post", "uuid: dev-1\nlabel: Post\nhelp: Write");
    dev.activate("blog.settings", "per_page: 10");

    let discovery = dev.discovery();
    let dev_target = dev.target();
    let export = SyncOrchestrator::new(dev.root(), &discovery, &dev_target)
        .export()
        .unwrap();
    assert_eq!(export.status(), ExportStatus::Written);

    let prod = OtherSite::new();
    prod.activate("blog.type.post", "uuid: prod-1\nlabel: Post\nhelp: Write");

    let report = SyncOrchestrator::new(prod.dir.path(), &discovery, &prod.target)
        .import_into_target()
        .unwrap()
        .into_result()
        .unwrap();

    // Only the uuid differs, so the existing item is left untouched
    assert_eq!(report.actions, vec!["create blog.settings (blog)"]);
    let post = prod.target.read("blog.type.post").unwrap().unwrap();
    assert_eq!(post["uuid"], "prod-1");
}

#[test]
fn test_site_edits_to_unmanaged_config_survive_import() {
    let mut site = TestSite::new();
    site.package("blog", "module", BLOG);
    site.ship("blog", "blog.type.post", "label: Post");
    site.ship("blog", "blog.settings", "per_page: 10");
    site.activate("blog.settings", "per_page: 25");

    let discovery = site.discovery();
    let target = site.target();
    let orchestrator = SyncOrchestrator::new(site.root(), &discovery, &target);

    assert_eq!(
        orchestrator.pending_names(ChangeKind::Create).unwrap(),
        vec!["blog.type.post"]
    );
    assert!(orchestrator.pending_names(ChangeKind::Update).unwrap().is_empty());

    orchestrator.import_into_target().unwrap();
    assert_eq!(
        target.read("blog.settings").unwrap(),
        Some(record("per_page: 25"))
    );
}

#[test]
fn test_managed_config_is_reset_to_the_package_version() {
    let mut site = TestSite::new();
    site.package("blog", "module", BLOG);
    site.ship("blog", "blog.type.post", "label: Post");
    site.activate("blog.type.post", "uuid: keep-me\nlabel: Changed on site");

    let discovery = site.discovery();
    let target = site.target();
    let report = SyncOrchestrator::new(site.root(), &discovery, &target)
        .import_into_target()
        .unwrap();

    assert_eq!(report.actions, vec!["update blog.type.post (blog)"]);
    assert_eq!(
        target.read("blog.type.post").unwrap(),
        Some(record("label: Post"))
    );
}

#[test]
fn test_retired_config_is_deleted_before_new_config_is_created() {
    let mut site = TestSite::new();
    site.package(
        "blog",
        "module",
        "cfgsync:\n  managed:\n    - blog.view.recent\n  delete:\n    - blog.view.archive\n    - blog.view.old\n",
    );
    site.ship("blog", "blog.view.recent", "title: Recent");
    site.activate("blog.view.old", "title: Old");
    site.activate(
        "blog.view.archive",
        "title: Archive\ndependencies:\n  config:\n    - blog.view.old",
    );

    let discovery = site.discovery();
    let target = site.target();
    let orchestrator = SyncOrchestrator::new(site.root(), &discovery, &target);

    let applied = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&applied);
    let applier = StorageApplier::new(&target, SyncLock::new(site.root().join(".cfgsync.lock")))
        .with_listener(move |operation: &ChangeOperation| {
            sink.lock().unwrap().push(operation.to_string())
        });

    let report = orchestrator.import(&applier).unwrap();

    assert!(report.is_clean());
    assert_eq!(
        *applied.lock().unwrap(),
        vec![
            "delete blog.view.archive (blog)",
            "delete blog.view.old (blog)",
            "create blog.view.recent (blog)",
        ]
    );
    site.assert_not_active("blog.view.old");
    site.assert_not_active("blog.view.archive");
    site.assert_active("blog.view.recent");
}

#[test]
fn test_conflicting_packages_stop_the_import() {
    let mut site = TestSite::new();
    site.package("blog", "module", BLOG);
    site.package("news", "module", "cfgsync:\n  managed:\n    - blog.type.post\n");
    site.ship("blog", "blog.type.post", "label: Post");
    site.ship("news", "blog.type.post", "label: News");

    let discovery = site.discovery();
    let target = site.target();
    let err = SyncOrchestrator::new(site.root(), &discovery, &target)
        .import_into_target()
        .unwrap_err();

    assert!(matches!(err, Error::OwnershipConflict { ref name, .. } if name == "blog.type.post"));
    assert!(!err.is_retryable());
    site.assert_not_active("blog.type.post");
}

#[test]
fn test_export_then_import_settles_on_one_site() {
    let mut site = TestSite::new();
    site.package(
        "shop",
        "module",
        "dependencies:\n  - commerce\ncfgsync:\n  managed:\n    - shop.product_type.book\n",
    );
    site.activate(
        "shop.product_type.book",
        "uuid: 1\nlabel: Book\ndependencies:\n  config:\n    - field.storage.isbn",
    );
    site.activate("field.storage.isbn", "uuid: 2\ntype: string");

    let discovery = site.discovery();
    let target = site.target();
    let mut settings = SyncSettings::default();
    settings.sync.with_dependencies = WithDependencies::All;
    let orchestrator =
        SyncOrchestrator::new(site.root(), &discovery, &target).with_settings(settings);

    let export = orchestrator.export().unwrap();
    assert_eq!(export.status(), ExportStatus::Written);
    assert!(site.read_manifest("shop").contains("  - field\n"));

    // What was just exported matches what is active
    assert!(orchestrator.preview().unwrap().is_none());
    assert!(orchestrator.export().unwrap().nothing_written());
}
