//! Path-level and textual diffs between two records.
//!
//! These are presentation helpers for previews; whether two records differ
//! at all is decided elsewhere, by the normalizing differ.

use serde_json::Value;
use similar::TextDiff;

use crate::{Error, Result};

/// Maximum recursion depth for diff operations
const MAX_DIFF_DEPTH: usize = 128;

/// Result of comparing two records path by path
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticDiff {
    /// Whether no path differs
    pub is_equivalent: bool,
    /// Changes in document order of the old value, then additions
    pub changes: Vec<SemanticChange>,
}

impl SemanticDiff {
    /// Create a diff indicating the values are equivalent
    pub fn equivalent() -> Self {
        Self {
            is_equivalent: true,
            changes: Vec::new(),
        }
    }

    /// Compute a diff between two JSON values
    ///
    /// Changes are reported with dotted paths (`display.default.weight`) and
    /// bracketed list indices (`items[2]`).
    pub fn compute(old: &Value, new: &Value) -> Self {
        let mut changes = Vec::new();
        diff_values(old, new, String::new(), &mut changes, 0);
        Self {
            is_equivalent: changes.is_empty(),
            changes,
        }
    }

    /// Paths touched by the diff, in report order
    pub fn paths(&self) -> Vec<&str> {
        self.changes.iter().map(SemanticChange::path).collect()
    }
}

impl Default for SemanticDiff {
    fn default() -> Self {
        Self::equivalent()
    }
}

/// A single change between two values
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticChange {
    /// Key/path added
    Added { path: String, value: Value },
    /// Key/path removed
    Removed { path: String, value: Value },
    /// Value changed at path
    Modified { path: String, old: Value, new: Value },
}

impl SemanticChange {
    /// The path this change applies to
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Modified { path, .. } => {
                path
            }
        }
    }
}

impl std::fmt::Display for SemanticChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added { path, value } => write!(f, "+ {path}: {value}"),
            Self::Removed { path, value } => write!(f, "- {path}: {value}"),
            Self::Modified { path, old, new } => write!(f, "~ {path}: {old} -> {new}"),
        }
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn diff_values(
    old: &Value,
    new: &Value,
    path: String,
    changes: &mut Vec<SemanticChange>,
    depth: usize,
) {
    // Past the depth limit a differing subtree is one modification
    if depth > MAX_DIFF_DEPTH {
        if old != new {
            changes.push(SemanticChange::Modified {
                path,
                old: old.clone(),
                new: new.clone(),
            });
        }
        return;
    }

    match (old, new) {
        (Value::Object(old_obj), Value::Object(new_obj)) => {
            for (key, old_value) in old_obj {
                let path = child_path(&path, key);
                match new_obj.get(key) {
                    Some(new_value) => diff_values(old_value, new_value, path, changes, depth + 1),
                    None => changes.push(SemanticChange::Removed {
                        path,
                        value: old_value.clone(),
                    }),
                }
            }
            for (key, new_value) in new_obj {
                if !old_obj.contains_key(key) {
                    changes.push(SemanticChange::Added {
                        path: child_path(&path, key),
                        value: new_value.clone(),
                    });
                }
            }
        }
        (Value::Array(old_arr), Value::Array(new_arr)) => {
            for i in 0..old_arr.len().max(new_arr.len()) {
                let path = format!("{path}[{i}]");
                match (old_arr.get(i), new_arr.get(i)) {
                    (Some(old_val), Some(new_val)) => {
                        diff_values(old_val, new_val, path, changes, depth + 1)
                    }
                    (Some(old_val), None) => changes.push(SemanticChange::Removed {
                        path,
                        value: old_val.clone(),
                    }),
                    (None, Some(new_val)) => changes.push(SemanticChange::Added {
                        path,
                        value: new_val.clone(),
                    }),
                    (None, None) => {}
                }
            }
        }
        _ => {
            if old != new {
                changes.push(SemanticChange::Modified {
                    path,
                    old: old.clone(),
                    new: new.clone(),
                });
            }
        }
    }
}

/// Render a unified diff of two values serialized as YAML.
///
/// `old_label` and `new_label` become the `---`/`+++` header names.
pub fn unified_yaml_diff(
    old: &Value,
    new: &Value,
    old_label: &str,
    new_label: &str,
) -> Result<String> {
    let old_text = to_yaml(old)?;
    let new_text = to_yaml(new)?;
    let diff = TextDiff::from_lines(&old_text, &new_text);
    Ok(diff
        .unified_diff()
        .context_radius(3)
        .header(old_label, new_label)
        .to_string())
}

fn to_yaml(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        other => serde_yaml::to_string(other).map_err(|e| Error::render("YAML", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_values_are_equivalent() {
        let value = json!({"a": {"b": [1, 2]}});
        assert!(SemanticDiff::compute(&value, &value).is_equivalent);
    }

    #[test]
    fn test_nested_modification_reports_dotted_path() {
        let old = json!({"display": {"default": {"weight": 1}}});
        let new = json!({"display": {"default": {"weight": 2}}});

        let diff = SemanticDiff::compute(&old, &new);
        assert_eq!(diff.paths(), vec!["display.default.weight"]);
    }

    #[test]
    fn test_list_changes_report_indices() {
        let old = json!({"items": [1, 2]});
        let new = json!({"items": [1, 3, 4]});

        let diff = SemanticDiff::compute(&old, &new);
        assert_eq!(diff.paths(), vec!["items[1]", "items[2]"]);
        assert!(matches!(diff.changes[1], SemanticChange::Added { .. }));
    }

    #[test]
    fn test_added_and_removed_keys() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"a": 1, "c": 3});

        let diff = SemanticDiff::compute(&old, &new);
        assert_eq!(diff.changes.len(), 2);
        assert_eq!(diff.changes[0].to_string(), "- b: 2");
        assert_eq!(diff.changes[1].to_string(), "+ c: 3");
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut old = json!({"leaf": 1});
        let mut new = json!({"leaf": 2});
        for _ in 0..200 {
            old = json!({"nested": old});
            new = json!({"nested": new});
        }

        let diff = SemanticDiff::compute(&old, &new);
        assert_eq!(diff.changes.len(), 1);
    }

    #[test]
    fn test_unified_diff_has_headers_and_hunks() {
        let old = json!({"name": "Old"});
        let new = json!({"name": "New"});

        let rendered = unified_yaml_diff(&old, &new, "active", "staged").unwrap();
        assert!(rendered.contains("--- active"));
        assert!(rendered.contains("+++ staged"));
        assert!(rendered.contains("-name: Old"));
        assert!(rendered.contains("+name: New"));
    }
}
