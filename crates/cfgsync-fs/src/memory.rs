//! In-memory config store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use crate::storage::DEFAULT_COLLECTION;
use crate::{ConfigRecord, ConfigStorage, Result};

/// A config store held entirely in memory.
///
/// Useful as a live target store in tests and as a scratch store when
/// previewing changes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collection: String,
    records: RwLock<BTreeMap<String, ConfigRecord>>,
}

impl MemoryStorage {
    /// Create an empty store for the default collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store for a named collection.
    pub fn for_collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            records: RwLock::default(),
        }
    }

    /// Create a store pre-populated with records.
    pub fn from_records<I, N>(records: I) -> Self
    where
        I: IntoIterator<Item = (N, ConfigRecord)>,
        N: Into<String>,
    {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|(name, record)| (name.into(), record))
                    .collect(),
            ),
        }
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfigStorage for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<ConfigRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(name).cloned())
    }

    fn write(&self, name: &str, record: &ConfigRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(name.to_string(), record.clone());
        Ok(())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.contains_key(name))
    }

    fn list_all(&self) -> Result<BTreeSet<String>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.keys().cloned().collect())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(name).is_some())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
