//! File-backed config store: one YAML file per record in a directory.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::record::validate_config_name;
use crate::storage::DEFAULT_COLLECTION;
use crate::{ConfigRecord, ConfigStorage, Error, Result, io};

/// File extension used for record files.
pub const RECORD_EXTENSION: &str = "yml";

/// A directory of `<name>.yml` record files.
///
/// A missing directory is treated as an empty store; it is created on the
/// first write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    directory: PathBuf,
    collection: String,
}

impl FileStorage {
    /// Create a store rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    /// Create a store for a named collection.
    ///
    /// Collections live in a sub-directory named after the collection, with
    /// dots replaced by slashes (`language.fr` becomes `language/fr`).
    pub fn for_collection(directory: impl Into<PathBuf>, collection: &str) -> Self {
        let mut directory = directory.into();
        if collection != DEFAULT_COLLECTION {
            for segment in collection.split('.') {
                directory.push(segment);
            }
        }
        Self {
            directory,
            collection: collection.to_string(),
        }
    }

    /// The directory this store reads from and writes to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The file path backing a record name.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    fn parse(&self, name: &str, path: &Path, content: &str) -> Result<ConfigRecord> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| Error::RecordParse {
            name: name.to_string(),
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        match value {
            // An empty file holds an empty record
            Value::Null => Ok(ConfigRecord::new()),
            Value::Object(map) => Ok(map),
            other => Err(Error::RecordParse {
                name: name.to_string(),
                path: path.to_path_buf(),
                message: format!("expected a mapping at the top level, found {other}"),
            }),
        }
    }
}

impl ConfigStorage for FileStorage {
    fn read(&self, name: &str) -> Result<Option<ConfigRecord>> {
        validate_config_name(name)?;
        let path = self.file_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        let content = io::read_text(&path)?;
        self.parse(name, &path, &content).map(Some)
    }

    fn write(&self, name: &str, record: &ConfigRecord) -> Result<()> {
        validate_config_name(name)?;
        let content = serde_yaml::to_string(record).map_err(|e| Error::RecordSerialize {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        let path = self.file_path(name);
        tracing::debug!(?path, name, "Writing config record");
        io::write_text(&path, &content)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        validate_config_name(name)?;
        Ok(self.file_path(name).is_file())
    }

    fn list_all(&self) -> Result<BTreeSet<String>> {
        if !self.directory.is_dir() {
            return Ok(BTreeSet::new());
        }

        let entries =
            fs::read_dir(&self.directory).map_err(|e| Error::io(&self.directory, e))?;
        let suffix = format!(".{RECORD_EXTENSION}");

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.directory, e))?;
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(name) = file_name.strip_suffix(&suffix)
                && validate_config_name(name).is_ok()
            {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        validate_config_name(name)?;
        let path = self.file_path(name);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
        Ok(true)
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
