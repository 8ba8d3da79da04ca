//! The equality oracle for config records.
//!
//! Every change decision (import updates, export rewrites) goes through
//! [`ConfigDiffer`], so two records are equal in exactly one sense across
//! the engine: equal after full normalization.

use cfgsync_content::SemanticDiff;
use cfgsync_fs::ConfigRecord;
use serde_json::Value;

use crate::normalize::Normalizer;

/// Compares records after normalizing both.
#[derive(Debug, Clone, Default)]
pub struct ConfigDiffer {
    normalizer: Normalizer,
}

impl ConfigDiffer {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Whether two records are the same, ignoring key order, ignored keys
    /// and empty containers.
    pub fn same(&self, a: &ConfigRecord, b: &ConfigRecord) -> bool {
        self.same_named("", a, b)
    }

    /// [`same`](Self::same) for two versions of the record `name`, so
    /// name-dependent keep rules apply.
    pub fn same_named(&self, name: &str, a: &ConfigRecord, b: &ConfigRecord) -> bool {
        self.normalizer.normalize(name, a, true) == self.normalizer.normalize(name, b, true)
    }

    /// Path-level differences from `old` to `new`, both normalized.
    pub fn describe(&self, name: &str, old: &ConfigRecord, new: &ConfigRecord) -> SemanticDiff {
        let old = Value::Object(self.normalizer.normalize(name, old, true));
        let new = Value::Object(self.normalizer.normalize(name, new, true));
        SemanticDiff::compute(&old, &new)
    }
}
