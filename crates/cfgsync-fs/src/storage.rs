//! The storage abstraction every config store implements.

use std::collections::BTreeSet;

use crate::{ConfigRecord, Result};

/// Name of the default (unnamed) collection.
pub const DEFAULT_COLLECTION: &str = "";

/// A store of named configuration records.
///
/// Both the per-package source directories and the live target store are
/// exposed through this trait. Methods take `&self`; implementations that
/// mutate shared state do so behind their own synchronization so a reader
/// (such as a source view layered over the target) and a writer (such as an
/// apply mechanism) can share one store.
pub trait ConfigStorage: Send + Sync {
    /// Read a record, returning `None` when it does not exist.
    fn read(&self, name: &str) -> Result<Option<ConfigRecord>>;

    /// Write (create or replace) a record.
    fn write(&self, name: &str, record: &ConfigRecord) -> Result<()>;

    /// Whether a record with this name exists.
    fn exists(&self, name: &str) -> Result<bool>;

    /// All record names, sorted.
    fn list_all(&self) -> Result<BTreeSet<String>>;

    /// Remove a record. Returns whether anything was removed.
    fn delete(&self, name: &str) -> Result<bool>;

    /// The collection this store holds.
    fn collection(&self) -> &str {
        DEFAULT_COLLECTION
    }
}

impl<T: ConfigStorage + ?Sized> ConfigStorage for &T {
    fn read(&self, name: &str) -> Result<Option<ConfigRecord>> {
        (**self).read(name)
    }

    fn write(&self, name: &str, record: &ConfigRecord) -> Result<()> {
        (**self).write(name, record)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        (**self).exists(name)
    }

    fn list_all(&self) -> Result<BTreeSet<String>> {
        (**self).list_all()
    }

    fn delete(&self, name: &str) -> Result<bool> {
        (**self).delete(name)
    }

    fn collection(&self) -> &str {
        (**self).collection()
    }
}
