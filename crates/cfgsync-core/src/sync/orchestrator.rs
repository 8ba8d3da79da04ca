//! SyncOrchestrator implementation
//!
//! The orchestrator ties discovery, the source view, the changelist builder
//! and an apply mechanism together. It never writes to the target store
//! itself; export is the only direction in which it writes, and then only
//! into package directories.

use std::path::{Path, PathBuf};

use cfgsync_extensions::{ManifestWriter, Package, PackageDiscovery, PackageKind, PackageRegistry};
use cfgsync_fs::{ConfigRecord, ConfigStorage, FileStorage, SyncLock};
use serde_json::Value;

use crate::apply::{ApplyError, ApplyMechanism, StorageApplier};
use crate::changelist::{ChangeKind, Changelist, ChangelistBuilder};
use crate::config::SyncSettings;
use crate::dependency::{CONFIG, DependencyListing, DependencyQuery, DependencyResolver, MODULE};
use crate::differ::ConfigDiffer;
use crate::ownership::{SourcePackage, SourceView, build_source_view};
use crate::{Error, Result};

use super::report::{ChangeDescription, ExportReport, ImportReport};

/// Manifest key holding package dependencies.
const DEPENDENCIES_KEY: &str = "dependencies";

/// Coordinates import and export between package directories and a target
/// store.
pub struct SyncOrchestrator<'a> {
    root: PathBuf,
    discovery: &'a dyn PackageDiscovery,
    target: &'a dyn ConfigStorage,
    settings: SyncSettings,
    differ: ConfigDiffer,
    manifest_writer: ManifestWriter,
}

impl std::fmt::Debug for SyncOrchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<'a> SyncOrchestrator<'a> {
    /// Create an orchestrator for the site at `root` with default settings.
    pub fn new(
        root: impl Into<PathBuf>,
        discovery: &'a dyn PackageDiscovery,
        target: &'a dyn ConfigStorage,
    ) -> Self {
        Self {
            root: root.into(),
            discovery,
            target,
            settings: SyncSettings::default(),
            differ: ConfigDiffer::default(),
            manifest_writer: ManifestWriter::new(),
        }
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.differ = ConfigDiffer::new(settings.normalizer());
        self.settings = settings;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn differ(&self) -> &ConfigDiffer {
        &self.differ
    }

    /// All installed packages, disabled ones included, keyed by name.
    pub fn registry(&self) -> Result<PackageRegistry> {
        Ok(PackageRegistry::from_packages(self.discovery.packages(true)?))
    }

    fn package_files(&self, package: &Package) -> FileStorage {
        FileStorage::for_collection(
            package.config_dir(&self.settings.sync.subdir),
            self.target.collection(),
        )
    }

    /// Enabled participating packages in processing order.
    pub fn source_packages(&self) -> Result<Vec<SourcePackage>> {
        Ok(self
            .discovery
            .packages(false)?
            .into_iter()
            .filter_map(|package| {
                let lists = package.ownership()?.clone();
                let files = self.package_files(&package);
                Some(SourcePackage::new(package.name, lists, files))
            })
            .collect())
    }

    /// Layer every participating package over the target store.
    pub fn source_view(&self) -> Result<SourceView<'a>> {
        let packages = self.source_packages()?;
        build_source_view(self.target, &packages, self.settings.sync.force_unmanaged)
    }

    /// The changelist an import would apply, or `None` when nothing would
    /// change.
    pub fn preview(&self) -> Result<Option<Changelist>> {
        let view = self.source_view()?;
        let changelist = ChangelistBuilder::new(self.differ.clone()).build(&view, self.target)?;
        Ok((!changelist.is_empty()).then_some(changelist))
    }

    /// Every pending change with a path-level diff of normalized values.
    pub fn describe(&self) -> Result<Vec<ChangeDescription>> {
        let Some(changelist) = self.preview()? else {
            return Ok(Vec::new());
        };

        let normalizer = self.differ.normalizer();
        let empty = ConfigRecord::new();
        let mut descriptions = Vec::with_capacity(changelist.len());
        for operation in changelist {
            let current = self.target.read(&operation.name)?;
            let diff = self.differ.describe(
                &operation.name,
                current.as_ref().unwrap_or(&empty),
                operation.record.as_ref().unwrap_or(&empty),
            );
            let render = |record: Option<&ConfigRecord>| {
                record.map_or(Value::Null, |record| {
                    Value::Object(normalizer.normalize(&operation.name, record, true))
                })
            };
            descriptions.push(ChangeDescription {
                kind: operation.kind,
                current: render(current.as_ref()),
                incoming: render(operation.record.as_ref()),
                diff,
                name: operation.name,
                package: operation.package,
            });
        }
        Ok(descriptions)
    }

    /// The reference apply mechanism, locking with the configured lock file.
    pub fn storage_applier(&self) -> StorageApplier<'a> {
        StorageApplier::new(self.target, SyncLock::new(self.settings.lock_path(&self.root)))
    }

    /// Import owned config from package directories through `mechanism`.
    ///
    /// Fails with [`Error::SyncInProgress`] when another run is active.
    /// Errors reported by the mechanism end up in the report; a run the
    /// mechanism aborted carries its message as the last error.
    pub fn import(&self, mechanism: &dyn ApplyMechanism) -> Result<ImportReport> {
        let Some(changelist) = self.preview()? else {
            tracing::info!("No configuration changes found to import");
            return Ok(ImportReport::no_changes());
        };

        if mechanism.already_in_progress()? {
            return Err(Error::SyncInProgress);
        }

        let actions: Vec<String> = changelist.iter().map(ToString::to_string).collect();
        tracing::info!(changes = actions.len(), "Importing configuration");

        match mechanism.apply(&changelist) {
            Ok(errors) => Ok(ImportReport {
                changes_found: true,
                actions,
                errors,
                aborted: false,
            }),
            Err(ApplyError::InProgress) => Err(Error::SyncInProgress),
            Err(ApplyError::Failed {
                mut errors,
                message,
            }) => {
                errors.push(message);
                Ok(ImportReport {
                    changes_found: true,
                    actions,
                    errors,
                    aborted: true,
                })
            }
        }
    }

    /// [`import`](Self::import) through [`storage_applier`](Self::storage_applier).
    pub fn import_into_target(&self) -> Result<ImportReport> {
        self.import(&self.storage_applier())
    }

    /// Export owned config from the target store into package directories.
    ///
    /// Disabled packages are exported too. Problems with one package are
    /// recorded in the report and do not stop the others.
    pub fn export(&self) -> Result<ExportReport> {
        let packages = self.discovery.packages(true)?;
        let registry = PackageRegistry::from_packages(packages.iter().cloned());
        let mut report = ExportReport::default();

        for package in packages.iter().filter(|package| package.participates()) {
            if let Err(error) = self.export_package(&registry, package, &mut report) {
                report.record_error(&package.name, &error);
            }
        }

        tracing::info!(
            packages = report.written.len(),
            failed = report.errors.len(),
            "Exported configuration"
        );
        Ok(report)
    }

    fn export_package(
        &self,
        registry: &PackageRegistry,
        package: &Package,
        report: &mut ExportReport,
    ) -> Result<()> {
        let Some(lists) = package.ownership() else {
            return Ok(());
        };
        let mut exportable = lists.exportable();
        if exportable.is_empty() {
            return Ok(());
        }

        let mode = self.settings.sync.with_dependencies;
        if mode.enabled() {
            let query = DependencyQuery {
                exclude_provided: mode.exclude_provided(),
                with_unmanaged: false,
                recursion_limit: self.settings.recursion_limit(),
            };
            let dependencies = self
                .resolver(registry)
                .package_dependencies(registry, &package.name, &query)?;

            // Themes cannot depend on modules
            if package.kind != PackageKind::Theme {
                self.add_missing_modules(package, &dependencies, report)?;
            }
            if let Some(configs) = dependencies.get(CONFIG) {
                exportable.extend(configs.iter().cloned());
            }
        }

        let files = self.package_files(package);
        let force = self.settings.sync.force_unmanaged;
        let fully_normalize = self.settings.sync.fully_normalize;

        for name in &exportable {
            let Some(data) = self.target.read(name)?.filter(|data| !data.is_empty()) else {
                report.record_error(
                    &package.name,
                    &Error::MissingSourceRecord {
                        package: package.name.clone(),
                        name: name.clone(),
                    },
                );
                continue;
            };

            let existing = files.read(name)?;
            if existing.is_some() && lists.is_unmanaged(name) && !force {
                tracing::debug!(name, package = %package.name, "Skipping exported unmanaged config");
                continue;
            }

            let unchanged = existing
                .as_ref()
                .is_some_and(|existing| self.differ.same_named(name, &data, existing));
            if !unchanged {
                let normalized = self.differ.normalizer().normalize(name, &data, fully_normalize);
                files.write(name, &normalized)?;
                report.record_written(&package.name, name.clone());
            }
        }
        Ok(())
    }

    fn add_missing_modules(
        &self,
        package: &Package,
        dependencies: &DependencyListing,
        report: &mut ExportReport,
    ) -> Result<()> {
        let Some(modules) = dependencies.get(MODULE) else {
            return Ok(());
        };
        let required = package.required_packages();
        let missing: Vec<&String> = modules
            .iter()
            .filter(|module| !required.contains(*module))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let manifest_path = package.manifest_path();
        let added = self
            .manifest_writer
            .add_to_list(&manifest_path, DEPENDENCIES_KEY, &missing)?;
        if !added.is_empty() {
            self.discovery.invalidate(&package.name);
            report.record_written(&package.name, manifest_path.display().to_string());
        }
        Ok(())
    }

    fn resolver<'r>(&'r self, registry: &'r PackageRegistry) -> DependencyResolver<'r> {
        DependencyResolver::new(self.target)
            .with_lookup(registry)
            .with_core_namespace(self.settings.site.core_namespace.clone())
    }

    /// Aggregated dependencies of the config `package` exports.
    pub fn package_dependencies(
        &self,
        package: &str,
        query: &DependencyQuery,
    ) -> Result<DependencyListing> {
        let registry = self.registry()?;
        self.resolver(&registry).package_dependencies(&registry, package, query)
    }

    /// Config depending on what `package` exports, not yet owned by it.
    pub fn package_suggestions(&self, package: &str) -> Result<Vec<String>> {
        let registry = self.registry()?;
        self.resolver(&registry).package_suggestions(
            &registry,
            package,
            self.settings.recursion_limit(),
        )
    }

    /// Names the pending changelist would create, update or delete, by kind.
    pub fn pending_names(&self, kind: ChangeKind) -> Result<Vec<String>> {
        Ok(self
            .preview()?
            .map(|changelist| {
                changelist
                    .names(kind)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}
