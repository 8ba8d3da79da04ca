//! Configuration record storage for cfgsync
//!
//! Provides the record type shared by every layer, the [`ConfigStorage`]
//! abstraction over named record stores, and the concrete file-backed and
//! in-memory stores built on top of safe, locked I/O.

pub mod error;
pub mod file;
pub mod io;
pub mod lock;
pub mod memory;
pub mod record;
pub mod storage;

pub use error::{Error, Result};
pub use file::FileStorage;
pub use lock::{SyncLock, SyncLockGuard};
pub use memory::MemoryStorage;
pub use record::{ConfigRecord, provider_namespace, validate_config_name};
pub use storage::{ConfigStorage, DEFAULT_COLLECTION};
