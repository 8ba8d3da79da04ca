//! Layered settings files driving a sync run

use std::fs;

use cfgsync_core::{Error, SettingsResolver, SyncOrchestrator, WithDependencies};
use cfgsync_test_utils::TestSite;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn resolver(site: &TestSite, global: &TempDir) -> SettingsResolver {
    SettingsResolver::with_global_config_dir(site.root(), global.path().to_path_buf())
}

#[test]
fn test_project_and_local_layers_shape_the_export() {
    let mut site = TestSite::new();
    site.package(
        "blog",
        "module",
        "cfgsync:\n  managed:\n    - blog.type.post\n  unmanaged:\n    - blog.settings\n",
    );
    fs::write(
        site.root().join("cfgsync.toml"),
        "[sync]\nsubdir = \"config/sync\"\nwith_dependencies = \"none\"\n",
    )
    .unwrap();
    fs::write(
        site.root().join("cfgsync.local.toml"),
        "[sync]\nforce_unmanaged = true\n",
    )
    .unwrap();
    fs::create_dir_all(site.package_dir("blog").join("config/sync")).unwrap();
    fs::write(
        site.package_dir("blog").join("config/sync/blog.settings.yml"),
        "per_page: 10\n",
    )
    .unwrap();
    site.activate("blog.type.post", "label: Post");
    site.activate("blog.settings", "per_page: 30");

    let global = TempDir::new().unwrap();
    let settings = resolver(&site, &global).resolve().unwrap();
    assert_eq!(settings.sync.subdir, "config/sync");
    assert_eq!(settings.sync.with_dependencies, WithDependencies::None);
    assert!(settings.sync.force_unmanaged);

    let discovery = site.discovery();
    let target = site.target();
    let report = SyncOrchestrator::new(site.root(), &discovery, &target)
        .with_settings(settings)
        .export()
        .unwrap();

    assert_eq!(report.written_for("blog"), ["blog.settings", "blog.type.post"]);
    let shipped = fs::read_to_string(
        site.package_dir("blog").join("config/sync/blog.settings.yml"),
    )
    .unwrap();
    assert!(shipped.contains("per_page: 30"));
    assert!(site.read_shipped("blog", "blog.type.post").is_none());
}

#[test]
fn test_global_layer_is_overridden_by_the_project() {
    let site = TestSite::new();
    let global = TempDir::new().unwrap();
    fs::write(
        global.path().join("config.toml"),
        "[sync]\nrecursion_limit = 3\nfully_normalize = true\n",
    )
    .unwrap();
    fs::write(
        site.root().join("cfgsync.toml"),
        "[sync]\nrecursion_limit = 0\n",
    )
    .unwrap();

    let settings = resolver(&site, &global).resolve().unwrap();

    assert_eq!(settings.recursion_limit(), None);
    assert!(settings.sync.fully_normalize);
}

#[test]
fn test_extra_ignore_keys_hide_site_only_changes() {
    let mut site = TestSite::new();
    site.package("blog", "module", "cfgsync:\n  managed:\n    - blog.type.post\n");
    site.ship("blog", "blog.type.post", "label: Post");
    site.activate("blog.type.post", "label: Post\nchanged: 1700000000");
    fs::write(
        site.root().join("cfgsync.toml"),
        "[normalize]\nignore_keys = [\"uuid\", \"_core\", \"changed\"]\n",
    )
    .unwrap();

    let global = TempDir::new().unwrap();
    let settings = resolver(&site, &global).resolve().unwrap();
    let discovery = site.discovery();
    let target = site.target();

    let default_run = SyncOrchestrator::new(site.root(), &discovery, &target);
    assert!(default_run.preview().unwrap().is_some());

    let configured = SyncOrchestrator::new(site.root(), &discovery, &target).with_settings(settings);
    assert!(configured.preview().unwrap().is_none());
}

#[test]
fn test_broken_layers_are_reported_with_their_path() {
    let site = TestSite::new();
    let global = TempDir::new().unwrap();
    let local = site.root().join("cfgsync.local.toml");
    fs::write(&local, "[sync]\nforce_unmanaged = \"yes\"\n").unwrap();

    match resolver(&site, &global).resolve().unwrap_err() {
        Error::InvalidSettings { path, .. } => assert_eq!(path, local),
        other => panic!("unexpected error: {other}"),
    }
}
