//! Core engine for cfgsync
//!
//! This crate decides which package owns each config item, how config items
//! depend on each other, and what has to change in a target store to match
//! the packages' exported config:
//!
//! - **Normalization**: canonical form of a record for comparison
//! - **Differ**: the one equality oracle used for every change decision
//! - **Ownership**: per-package claims layered into a virtual source view,
//!   rejecting any name claimed twice
//! - **Dependencies**: forward and reverse traversal with per-query memo and
//!   depth limit
//! - **Changelist**: create, update and delete operations in dependency order
//! - **Sync**: import through an apply mechanism, export back into packages
//!
//! # Architecture
//!
//! `cfgsync-core` sits above the Layer 0 crates:
//!
//! ```text
//!                 cfgsync-core
//!                      |
//!      +---------------+----------------+
//!      |               |                |
//! cfgsync-fs   cfgsync-content   cfgsync-extensions
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cfgsync_core::{SettingsResolver, SyncOrchestrator};
//! use cfgsync_extensions::DirectoryDiscovery;
//! use cfgsync_fs::FileStorage;
//!
//! let settings = SettingsResolver::new("/srv/site").resolve()?;
//! let discovery = DirectoryDiscovery::new("/srv/site/modules");
//! let target = FileStorage::new("/srv/site/config/active");
//!
//! let orchestrator = SyncOrchestrator::new("/srv/site", &discovery, &target)
//!     .with_settings(settings);
//! if let Some(changes) = orchestrator.preview()? {
//!     for change in &changes {
//!         println!("{change}");
//!     }
//! }
//! let report = orchestrator.import_into_target()?.into_result()?;
//! ```

pub mod apply;
pub mod changelist;
pub mod config;
pub mod dependency;
pub mod differ;
pub mod error;
pub mod installer;
pub mod normalize;
pub mod ownership;
pub mod sync;

pub use apply::{ApplyError, ApplyListener, ApplyMechanism, StorageApplier};
pub use changelist::{ChangeKind, ChangeOperation, Changelist, ChangelistBuilder};
pub use config::{SettingsResolver, SyncSettings, WithDependencies};
pub use dependency::{
    Dependencies, DependencyListing, DependencyQuery, DependencyResolver, ResolveSession,
    ReverseIndex,
};
pub use differ::ConfigDiffer;
pub use error::{Error, Result};
pub use installer::{ConfigInstaller, OwnershipAwareInstaller, StorageInstaller};
pub use normalize::{KeepRule, Normalizer, UuidKeyedEffects, normalize};
pub use ownership::{OwnershipMap, SourcePackage, SourceView, Staged, build_source_view};
pub use sync::{ChangeDescription, ExportReport, ExportStatus, ImportReport, SyncOrchestrator};
