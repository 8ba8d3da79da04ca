//! Applying a changelist to a target store.
//!
//! The sync engine never writes itself; it hands changelists to an
//! [`ApplyMechanism`]. [`StorageApplier`] is the reference mechanism: it
//! writes into a [`ConfigStorage`] while holding an advisory [`SyncLock`],
//! so two overlapping runs against the same store cannot interleave.

use cfgsync_fs::{ConfigStorage, SyncLock};

use crate::Error;
use crate::changelist::{ChangeKind, ChangeOperation, Changelist};

/// Failure of an apply run as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// Another run holds the lock.
    #[error("Another process may be synchronizing configuration already")]
    InProgress,

    /// The run aborted. `errors` holds what was reported before it did.
    #[error("{message}")]
    Failed { errors: Vec<String>, message: String },
}

impl From<ApplyError> for Error {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::InProgress => Error::SyncInProgress,
            ApplyError::Failed { mut errors, message } => {
                errors.push(message);
                Error::ApplyFailure { errors }
            }
        }
    }
}

/// Writes approved changes and emits lifecycle notifications.
pub trait ApplyMechanism {
    /// Whether another synchronization is running against the target.
    fn already_in_progress(&self) -> crate::Result<bool>;

    /// Apply every operation in order.
    ///
    /// Per-operation problems are returned as messages and do not stop the
    /// run.
    fn apply(&self, changelist: &Changelist) -> Result<Vec<String>, ApplyError>;
}

/// Notified about each operation a [`StorageApplier`] carries out.
pub trait ApplyListener: Send + Sync {
    fn on_applied(&self, operation: &ChangeOperation);

    /// Called once the run finished, with the errors it reported.
    fn on_finished(&self, _applied: usize, _errors: &[String]) {}
}

impl<F> ApplyListener for F
where
    F: Fn(&ChangeOperation) + Send + Sync,
{
    fn on_applied(&self, operation: &ChangeOperation) {
        self(operation)
    }
}

/// Applies changelists to a config store under a lock file.
pub struct StorageApplier<'a> {
    target: &'a dyn ConfigStorage,
    lock: SyncLock,
    listener: Option<Box<dyn ApplyListener + 'a>>,
}

impl std::fmt::Debug for StorageApplier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageApplier")
            .field("lock", &self.lock)
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> StorageApplier<'a> {
    pub fn new(target: &'a dyn ConfigStorage, lock: SyncLock) -> Self {
        Self {
            target,
            lock,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl ApplyListener + 'a) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    fn apply_one(&self, operation: &ChangeOperation) -> Result<(), String> {
        if operation.collection != self.target.collection() {
            return Err(format!(
                "{operation}: collection '{}' does not match target collection '{}'",
                operation.collection,
                self.target.collection()
            ));
        }

        match (operation.kind, &operation.record) {
            (ChangeKind::Create | ChangeKind::Update, Some(record)) => self
                .target
                .write(&operation.name, record)
                .map_err(|e| format!("{operation}: {e}")),
            (ChangeKind::Create | ChangeKind::Update, None) => {
                Err(format!("{operation}: no record to write"))
            }
            (ChangeKind::Delete, _) => self
                .target
                .delete(&operation.name)
                .map(|_| ())
                .map_err(|e| format!("{operation}: {e}")),
        }
    }
}

impl ApplyMechanism for StorageApplier<'_> {
    fn already_in_progress(&self) -> crate::Result<bool> {
        Ok(self.lock.is_held()?)
    }

    fn apply(&self, changelist: &Changelist) -> Result<Vec<String>, ApplyError> {
        let _guard = self
            .lock
            .try_acquire()
            .map_err(|e| ApplyError::Failed {
                errors: Vec::new(),
                message: e.to_string(),
            })?
            .ok_or(ApplyError::InProgress)?;

        let mut errors = Vec::new();
        let mut applied = 0;
        for operation in changelist {
            match self.apply_one(operation) {
                Ok(()) => {
                    applied += 1;
                    tracing::debug!(operation = %operation, "Applied change");
                    if let Some(listener) = &self.listener {
                        listener.on_applied(operation);
                    }
                }
                Err(message) => {
                    tracing::warn!(%message, "Change failed");
                    errors.push(message);
                }
            }
        }

        if let Some(listener) = &self.listener {
            listener.on_finished(applied, &errors);
        }
        tracing::info!(applied, failed = errors.len(), "Applied changelist");
        Ok(errors)
    }
}
