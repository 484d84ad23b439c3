//! Storage trait definition and the scoped transaction helper.

use crate::error::{StorageError, StorageResult};
use crate::snapshot::Snapshot;

/// A persistence backend for a full database snapshot.
///
/// A `Storage` (de)serializes the current state of the database and keeps it
/// in some place (a file on disk, memory, ...). Every write replaces the
/// whole snapshot; there are no partial updates. Transactions are layered on
/// top with [`begin`](Storage::begin), [`commit`](Storage::commit) and
/// [`rollback`](Storage::rollback) — prefer the scoped
/// [`StorageExt::transaction`] helper over calling those directly.
///
/// # Invariants
///
/// - `read` never exposes a partially written snapshot: it returns either
///   `None` (nothing has ever been written) or a complete snapshot
/// - At most one transaction is open per instance at a time; transactions
///   do not nest
/// - A single instance must not be used from multiple threads for
///   overlapping transactions; the in-transaction flag is not synchronized
///
/// # Implementors
///
/// - [`super::FileStorage`] - single JSON file on disk
/// - [`super::MemoryStorage`] - in-process, for tests and ephemeral data
pub trait Storage {
    /// Reads the current snapshot.
    ///
    /// Returns `Ok(None)` when nothing has ever been written. An empty
    /// medium is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read or its content is not
    /// a valid serialized snapshot.
    fn read(&mut self) -> StorageResult<Option<Snapshot>>;

    /// Replaces the entire visible snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] if the medium was opened without
    /// write permission, or an error if the write fails.
    fn write(&mut self, snapshot: &Snapshot) -> StorageResult<()>;

    /// Releases held resources (file handles, ...).
    ///
    /// Idempotent and safe to call without an open transaction. Callers
    /// must not close a storage mid-transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing a resource fails.
    fn close(&mut self) -> StorageResult<()>;

    /// Begins a new transaction.
    ///
    /// Marks the instance as in-transaction, then runs backend-specific
    /// start logic (acquire locks, snapshot a backup). If the start logic
    /// fails, the flag is cleared again before the error propagates.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TransactionInProgress`] if a transaction is
    /// already open.
    fn begin(&mut self) -> StorageResult<()>;

    /// Commits the current transaction.
    ///
    /// Runs backend-specific commit logic (flush, discard the backup,
    /// release locks). The in-transaction flag is cleared afterwards even
    /// when that logic errors, so an instance never stays stuck believing a
    /// transaction is open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoTransaction`] if no transaction is open.
    fn commit(&mut self) -> StorageResult<()>;

    /// Rolls back the current transaction.
    ///
    /// Runs backend-specific rollback logic (restore the backup, release
    /// locks). Clears the in-transaction flag with the same guarantee as
    /// [`commit`](Storage::commit).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoTransaction`] if no transaction is open.
    fn rollback(&mut self) -> StorageResult<()>;

    /// Returns whether a transaction is currently open.
    fn in_transaction(&self) -> bool;
}

/// Tracks whether a transaction is open on a storage instance.
///
/// Both backends embed one of these so the state checks in
/// `begin`/`commit`/`rollback` live in one place instead of being
/// duplicated per backend.
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    active: bool,
}

impl TransactionState {
    /// Marks a transaction as open.
    pub(crate) fn begin(&mut self) -> StorageResult<()> {
        if self.active {
            return Err(StorageError::TransactionInProgress);
        }
        self.active = true;
        Ok(())
    }

    /// Fails unless a transaction is open.
    pub(crate) fn require_active(&self) -> StorageResult<()> {
        if !self.active {
            return Err(StorageError::NoTransaction);
        }
        Ok(())
    }

    /// Clears the flag unconditionally.
    pub(crate) fn clear(&mut self) {
        self.active = false;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }
}

/// Scoped transaction handling for any [`Storage`].
///
/// Blanket-implemented; bring the trait into scope and every storage gains
/// [`transaction`](StorageExt::transaction).
pub trait StorageExt: Storage {
    /// Runs `body` inside a transaction.
    ///
    /// Begins a transaction, runs the closure, commits on success and rolls
    /// back on failure. The closure's error is returned untouched; a
    /// rollback failure on that path is logged and swallowed so the
    /// original error is never masked.
    ///
    /// This is the single recommended way to make a read-modify-write
    /// sequence atomic:
    ///
    /// ```
    /// use leafdb_storage::{MemoryStorage, Storage, StorageExt};
    ///
    /// let mut storage = MemoryStorage::new();
    /// storage.transaction(|s| {
    ///     let snapshot = s.read()?.unwrap_or_default();
    ///     s.write(&snapshot)
    /// })?;
    /// # Ok::<(), leafdb_storage::StorageError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the error from `begin`, the closure, or `commit`.
    fn transaction<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        self.begin()?;
        match body(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    tracing::warn!(
                        "rollback failed after transaction error: {}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
