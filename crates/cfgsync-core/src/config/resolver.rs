//! Settings resolution with hierarchical merge

use std::path::{Path, PathBuf};

use cfgsync_fs::io;
use toml::Value;

use super::settings::SyncSettings;
use crate::{Error, Result};

/// Directory name under the platform config directory.
pub const GLOBAL_DIR_NAME: &str = "cfgsync";
/// Project settings file, relative to the site root.
pub const PROJECT_FILE: &str = "cfgsync.toml";
/// Local overrides, relative to the site root. Usually kept out of version
/// control.
pub const LOCAL_FILE: &str = "cfgsync.local.toml";

/// Resolves settings by merging the global, project and local layers.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    root: PathBuf,
    /// Override for the global config directory, used by tests.
    global_config_dir_override: Option<PathBuf>,
}

impl SettingsResolver {
    /// Create a resolver for the site at `root`.
    ///
    /// The global layer lives in the platform config directory:
    /// - Linux: `~/.config/cfgsync/`
    /// - macOS: `~/Library/Application Support/cfgsync/`
    /// - Windows: `%APPDATA%\cfgsync\`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            global_config_dir_override: None,
        }
    }

    /// Create a resolver reading the global layer from `global_config_dir`.
    pub fn with_global_config_dir(root: impl Into<PathBuf>, global_config_dir: PathBuf) -> Self {
        Self {
            root: root.into(),
            global_config_dir_override: Some(global_config_dir),
        }
    }

    fn global_config_dir(&self) -> Option<PathBuf> {
        if let Some(ref override_dir) = self.global_config_dir_override {
            return Some(override_dir.clone());
        }
        dirs::config_dir().map(|d| d.join(GLOBAL_DIR_NAME))
    }

    /// Layer files in merge order. Missing files are included.
    pub fn layers(&self) -> Vec<PathBuf> {
        let mut layers = Vec::with_capacity(3);
        if let Some(global_dir) = self.global_config_dir() {
            layers.push(global_dir.join("config.toml"));
        }
        layers.push(self.root.join(PROJECT_FILE));
        layers.push(self.root.join(LOCAL_FILE));
        layers
    }

    /// Resolve the effective settings.
    ///
    /// Missing layers are skipped. Invalid TOML, or a value of the wrong
    /// type, in any layer is an error naming that layer.
    pub fn resolve(&self) -> Result<SyncSettings> {
        let mut merged = Value::Table(toml::Table::new());

        for path in self.layers() {
            if !path.is_file() {
                tracing::debug!(?path, "No settings layer found, skipping");
                continue;
            }
            tracing::debug!(?path, "Loading settings layer");
            let layer = load_layer(&path)?;
            merge_values(&mut merged, layer);
        }

        let settings: SyncSettings = merged.try_into().map_err(|source| Error::InvalidSettings {
            path: self.root.join(PROJECT_FILE),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a project settings file exists.
    pub fn has_config(&self) -> bool {
        self.root.join(PROJECT_FILE).is_file()
    }

    /// Whether local overrides exist.
    pub fn has_local_overrides(&self) -> bool {
        self.root.join(LOCAL_FILE).is_file()
    }
}

fn load_layer(path: &Path) -> Result<Value> {
    let content = io::read_text(path)?;
    let invalid = |source| Error::InvalidSettings {
        path: path.to_path_buf(),
        source,
    };
    let value: Value = toml::from_str(&content).map_err(invalid)?;
    // Type errors are reported against the layer that caused them
    value.clone().try_into::<SyncSettings>().map_err(invalid)?;
    Ok(value)
}

/// Merge `overlay` into `base`: tables key by key, anything else replaced.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base), Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
