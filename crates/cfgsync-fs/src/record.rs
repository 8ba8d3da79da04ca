//! The configuration record type and helpers for config names.
//!
//! A record is a named, arbitrarily nested mapping of string keys to
//! JSON-like values. Names are dot-segmented (`image.style.thumbnail`); the
//! segment before the first dot names the provider namespace.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// A single configuration record.
///
/// Key order is preserved as read, so callers that care about ordering
/// (for example view displays) see it unchanged until normalized.
pub type ConfigRecord = Map<String, Value>;

/// Return the provider namespace of a config name.
///
/// The namespace is everything before the first `.`; a name without a dot
/// is its own namespace.
///
/// ```
/// use cfgsync_fs::provider_namespace;
///
/// assert_eq!(provider_namespace("field.storage.node.body"), "field");
/// assert_eq!(provider_namespace("standalone"), "standalone");
/// ```
pub fn provider_namespace(name: &str) -> &str {
    name.split_once('.').map_or(name, |(provider, _)| provider)
}

/// Validate that a config name can be used as a file stem.
///
/// Names must be non-empty and must not contain path separators or NUL bytes,
/// and must not start with a dot.
pub fn validate_config_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("config name must not be empty")
    } else if name.starts_with('.') {
        Some("config name must not start with a dot")
    } else if name.contains(['/', '\\', '\0']) {
        Some("config name must not contain path separators")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
