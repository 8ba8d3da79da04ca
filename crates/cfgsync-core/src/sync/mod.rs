//! Import and export between package directories and a target store
//!
//! - **import**: layer owned config over the target, build an ordered
//!   changelist and hand it to an apply mechanism
//! - **preview** / **describe**: the same changelist without applying it
//! - **export**: write the target's current values of owned config back
//!   into package directories
//! - **package_dependencies** / **package_suggestions**: reports used while
//!   maintaining package manifests

mod orchestrator;
mod report;

pub use orchestrator::SyncOrchestrator;
pub use report::{ChangeDescription, ExportReport, ExportStatus, ImportReport};
