//! Package system for cfgsync.
//!
//! This crate provides manifest parsing, package discovery, a name to kind
//! registry, and the text-preserving manifest writer used by export.

pub mod discovery;
pub mod error;
pub mod manifest;
pub mod manifest_writer;
pub mod package;
pub mod registry;

/// Suffix of a package manifest file.
///
/// A package named `node` keeps its manifest at `node/node.info.yml`.
pub const MANIFEST_SUFFIX: &str = ".info.yml";

pub use discovery::{DirectoryDiscovery, ManifestCache, PackageDiscovery};
pub use error::{Error, Result};
pub use manifest::{OwnershipLists, PackageManifest};
pub use manifest_writer::ManifestWriter;
pub use package::{Package, PackageKind, validate_machine_name};
pub use registry::{PackageLookup, PackageRegistry};
