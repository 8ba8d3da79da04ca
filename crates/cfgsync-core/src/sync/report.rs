//! Reports returned by import, export and preview.

use std::collections::BTreeMap;

use cfgsync_content::{SemanticDiff, unified_yaml_diff};
use serde::Serialize;
use serde_json::Value;

use crate::changelist::ChangeKind;
use crate::{Error, Result};

/// Outcome of an import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Whether there was anything to import.
    pub changes_found: bool,
    /// Operations handed to the apply mechanism, in order.
    pub actions: Vec<String>,
    /// Errors reported by the apply mechanism.
    pub errors: Vec<String>,
    /// Whether the apply mechanism aborted part way.
    pub aborted: bool,
}

impl ImportReport {
    /// A report for a run with nothing to import.
    pub fn no_changes() -> Self {
        Self::default()
    }

    /// Whether the run found changes and applied them without errors.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn reported errors into [`Error::ApplyFailure`].
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(Error::ApplyFailure {
                errors: self.errors,
            })
        }
    }
}

/// Overall status of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportStatus {
    /// No file was written; everything was already up to date.
    NothingWritten,
    Written,
    /// Some files were written and some packages reported errors.
    WrittenWithErrors,
}

/// Outcome of an export run, per package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Config names (and edited manifest paths) written, by package.
    pub written: BTreeMap<String, Vec<String>>,
    /// Soft errors, by package.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ExportReport {
    pub(crate) fn record_written(&mut self, package: &str, item: impl Into<String>) {
        self.written
            .entry(package.to_string())
            .or_default()
            .push(item.into());
    }

    pub(crate) fn record_error(&mut self, package: &str, error: &Error) {
        tracing::warn!(package, %error, "Export problem");
        self.errors
            .entry(package.to_string())
            .or_default()
            .push(error.to_string());
    }

    pub fn nothing_written(&self) -> bool {
        self.written.is_empty()
    }

    pub fn status(&self) -> ExportStatus {
        if self.nothing_written() {
            ExportStatus::NothingWritten
        } else if self.errors.is_empty() {
            ExportStatus::Written
        } else {
            ExportStatus::WrittenWithErrors
        }
    }

    /// Names written for `package`.
    pub fn written_for(&self, package: &str) -> &[String] {
        self.written.get(package).map_or(&[], Vec::as_slice)
    }

    /// Errors reported for `package`.
    pub fn errors_for(&self, package: &str) -> &[String] {
        self.errors.get(package).map_or(&[], Vec::as_slice)
    }
}

/// A pending change rendered for review.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDescription {
    pub kind: ChangeKind,
    pub name: String,
    pub package: Option<String>,
    /// Normalized current value, `Null` when absent.
    pub current: Value,
    /// Normalized incoming value, `Null` for deletions.
    pub incoming: Value,
    pub diff: SemanticDiff,
}

impl ChangeDescription {
    /// Render the change as a unified YAML diff.
    pub fn unified(&self) -> Result<String> {
        Ok(unified_yaml_diff(
            &self.current,
            &self.incoming,
            &format!("target/{}", self.name),
            &format!("source/{}", self.name),
        )?)
    }
}
