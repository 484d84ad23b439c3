//! In-memory snapshot storage.

use crate::error::StorageResult;
use crate::snapshot::Snapshot;
use crate::storage::{Storage, TransactionState};

/// An in-memory storage.
///
/// Holds the snapshot as an in-process value; nothing touches disk, so
/// reads and writes carry no serialization cost. Suitable for unit tests
/// and ephemeral databases. Transactions keep a structurally independent
/// copy of the snapshot as the rollback target; no locking is involved
/// because an instance is assumed single-threaded-cooperative.
///
/// # Example
///
/// ```
/// use leafdb_storage::{MemoryStorage, Snapshot, Storage};
///
/// let mut storage = MemoryStorage::new();
/// assert_eq!(storage.read()?, None);
/// storage.write(&Snapshot::new())?;
/// assert_eq!(storage.read()?, Some(Snapshot::new()));
/// # Ok::<(), leafdb_storage::StorageError>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    memory: Option<Snapshot>,
    /// `Some(_)` only while a transaction is open; the inner `Option` is
    /// the snapshot state at begin, which may itself be absent.
    backup: Option<Option<Snapshot>>,
    txn: TransactionState,
}

impl MemoryStorage {
    /// Creates a new empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage preloaded with a snapshot.
    ///
    /// Useful for test fixtures.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            memory: Some(snapshot),
            ..Self::default()
        }
    }

    /// Returns the current snapshot without copying it.
    #[must_use]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.memory.as_ref()
    }
}

impl Storage for MemoryStorage {
    fn read(&mut self) -> StorageResult<Option<Snapshot>> {
        Ok(self.memory.clone())
    }

    fn write(&mut self, snapshot: &Snapshot) -> StorageResult<()> {
        self.memory = Some(snapshot.clone());
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        // No resources to release.
        Ok(())
    }

    fn begin(&mut self) -> StorageResult<()> {
        self.txn.begin()?;
        // Clone is a deep, structurally independent copy; later writes
        // must not leak into the rollback target.
        self.backup = Some(self.memory.clone());
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.txn.require_active()?;
        self.backup = None;
        self.txn.clear();
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.txn.require_active()?;
        self.memory = self.backup.take().flatten();
        self.txn.clear();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_active()
    }
}
