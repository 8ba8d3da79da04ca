//! Records from inline YAML.

use cfgsync_fs::ConfigRecord;
use serde_json::Value;

/// Parse a YAML mapping into a record.
///
/// # Panics
/// Panics if `yaml` is not a mapping.
///
/// ```
/// use cfgsync_test_utils::record;
///
/// let site = record("name: Example\npage:\n  front: /node");
/// assert_eq!(site["page"]["front"], "/node");
/// ```
pub fn record(yaml: &str) -> ConfigRecord {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) => ConfigRecord::new(),
        Ok(other) => panic!("record: expected a mapping, found {other}"),
        Err(e) => panic!("record: invalid YAML: {e}"),
    }
}
