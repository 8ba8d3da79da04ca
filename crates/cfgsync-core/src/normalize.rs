//! Canonical form of config records for comparison.
//!
//! Normalizing strips ignorable keys at every level and, when sorting and
//! filtering, drops containers that end up empty and orders mapping keys.
//! Each nested value is visited under a qualified name (`name.key`), which
//! [`KeepRule`]s use to keep an otherwise ignored key inside a subtree.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use cfgsync_fs::ConfigRecord;
use regex::Regex;
use serde_json::{Map, Value};

/// Keys ignored when none are configured.
pub const DEFAULT_IGNORE_KEYS: &[&str] = &["uuid", "_core"];

static IMAGE_STYLE_EFFECTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^image\.style\.[^.]+\.effects").unwrap());

/// Keeps an ignored key inside one subtree.
pub trait KeepRule: Send + Sync {
    /// Whether `ignored` must be kept while normalizing `value`, found at
    /// `key` inside the value named `name`.
    fn keeps(&self, name: &str, key: &str, value: &Value, ignored: &str) -> bool;
}

/// Image style effects are keyed by their own UUID, so the `uuid` of each
/// effect is structural and must survive normalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidKeyedEffects;

impl KeepRule for UuidKeyedEffects {
    fn keeps(&self, name: &str, key: &str, value: &Value, ignored: &str) -> bool {
        ignored == "uuid"
            && value.get("uuid").and_then(Value::as_str) == Some(key)
            && IMAGE_STYLE_EFFECTS.is_match(name)
    }
}

/// Record normalizer.
#[derive(Clone)]
pub struct Normalizer {
    ignore_keys: BTreeSet<String>,
    rules: Vec<Arc<dyn KeepRule>>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("ignore_keys", &self.ignore_keys)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_KEYS.iter().copied())
    }
}

impl Normalizer {
    /// A normalizer ignoring `ignore_keys`, with the image style effects rule.
    pub fn new<I, S>(ignore_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore_keys: ignore_keys.into_iter().map(Into::into).collect(),
            rules: vec![Arc::new(UuidKeyedEffects)],
        }
    }

    /// A normalizer with no keep rules at all.
    pub fn without_rules(mut self) -> Self {
        self.rules.clear();
        self
    }

    /// Add a keep rule.
    pub fn with_rule(mut self, rule: impl KeepRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn ignore_keys(&self) -> &BTreeSet<String> {
        &self.ignore_keys
    }

    /// Normalize a record named `name`.
    ///
    /// With `sort_and_filter` unset only ignored keys are stripped, keeping
    /// meaningful key order intact.
    pub fn normalize(
        &self,
        name: &str,
        record: &ConfigRecord,
        sort_and_filter: bool,
    ) -> ConfigRecord {
        let ignore: Vec<&str> = self.ignore_keys.iter().map(String::as_str).collect();
        self.normalize_map(name, record, sort_and_filter, &ignore)
    }

    fn normalize_map(
        &self,
        name: &str,
        map: &Map<String, Value>,
        sort_and_filter: bool,
        ignore: &[&str],
    ) -> Map<String, Value> {
        let mut entries: Vec<(String, Value)> = Vec::with_capacity(map.len());

        for (key, value) in map {
            if ignore.contains(&key.as_str()) {
                continue;
            }
            match self.normalize_child(name, key, value, sort_and_filter, ignore) {
                Some(value) => entries.push((key.clone(), value)),
                None => continue,
            }
        }

        if sort_and_filter {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
        }
        entries.into_iter().collect()
    }

    /// Normalize the value at `key`; `None` drops it from its parent.
    fn normalize_child(
        &self,
        name: &str,
        key: &str,
        value: &Value,
        sort_and_filter: bool,
        ignore: &[&str],
    ) -> Option<Value> {
        if !value.is_object() && !value.is_array() {
            return Some(value.clone());
        }

        let child_ignore: Vec<&str> = ignore
            .iter()
            .copied()
            .filter(|ignored| {
                !self
                    .rules
                    .iter()
                    .any(|rule| rule.keeps(name, key, value, ignored))
            })
            .collect();
        let child_name = format!("{name}.{key}");

        let normalized = match value {
            Value::Object(map) => Value::Object(self.normalize_map(
                &child_name,
                map,
                sort_and_filter,
                &child_ignore,
            )),
            Value::Array(items) => Value::Array(self.normalize_list(
                &child_name,
                items,
                sort_and_filter,
                &child_ignore,
            )),
            _ => value.clone(),
        };

        if sort_and_filter && is_empty_container(&normalized) {
            None
        } else {
            Some(normalized)
        }
    }

    fn normalize_list(
        &self,
        name: &str,
        items: &[Value],
        sort_and_filter: bool,
        ignore: &[&str],
    ) -> Vec<Value> {
        // List order is meaningful and never sorted
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                self.normalize_child(name, &index.to_string(), item, sort_and_filter, ignore)
            })
            .collect()
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Normalize with the default ignore keys and rules.
pub fn normalize(name: &str, record: &ConfigRecord, sort_and_filter: bool) -> ConfigRecord {
    Normalizer::default().normalize(name, record, sort_and_filter)
}
