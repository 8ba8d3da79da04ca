//! Advisory lock guarding a synchronization run against one target store.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// A lock file that at most one synchronization run may hold at a time.
///
/// The lock is advisory (`fs2` exclusive locks), so it protects against other
/// cooperating runs, in this process or another, rather than arbitrary writers.
#[derive(Debug, Clone)]
pub struct SyncLock {
    path: PathBuf,
}

/// Proof that a [`SyncLock`] is held. The lock is released on drop.
#[derive(Debug)]
pub struct SyncLockGuard {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Create a lock backed by the file at `path`. Nothing is touched on disk
    /// until the lock is first acquired.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Ok(None)` when another holder already has it.
    pub fn try_acquire(&self) -> Result<Option<SyncLockGuard>> {
        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = ?self.path, "Acquired sync lock");
                Ok(Some(SyncLockGuard {
                    file,
                    path: self.path.clone(),
                }))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(_) => Err(Error::LockFailed {
                path: self.path.clone(),
            }),
        }
    }

    /// Whether some other holder currently has the lock.
    pub fn is_held(&self) -> Result<bool> {
        Ok(self.try_acquire()?.is_none())
    }
}

impl SyncLockGuard {
    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = ?self.path, error = %e, "Failed to release sync lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_is_refused_while_held() {
        let dir = tempdir().unwrap();
        let lock = SyncLock::new(dir.path().join("sync.lock"));

        let guard = lock.try_acquire().unwrap();
        assert!(guard.is_some());
        assert!(lock.try_acquire().unwrap().is_none());
        assert!(lock.is_held().unwrap());

        drop(guard);
        assert!(!lock.is_held().unwrap());
    }
}
