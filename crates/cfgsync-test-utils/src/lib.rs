//! Shared test utilities for the cfgsync workspace.
//!
//! This crate provides standardised site fixtures so crate test suites do
//! not each lay out package directories by hand. It is a dev-dependency
//! only, never published.
//!
//! # Modules
//!
//! - [`site`]: [`TestSite`] builder for packages, shipped config and an
//!   active config store
//! - [`record`]: building records from inline YAML

pub mod record;
pub mod site;

pub use record::record;
pub use site::{PACKAGES_DIR, TARGET_DIR, TestSite};
