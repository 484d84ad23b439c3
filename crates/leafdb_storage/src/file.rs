//! File-backed snapshot storage.
//!
//! The snapshot lives in a single JSON file. Two companion files at derived
//! paths make transactions possible on a medium that is not natively
//! transactional:
//!
//! ```text
//! db.json          # the snapshot
//! db.json.lock     # advisory exclusive lock, held while a transaction is open
//! db.json.backup   # verbatim copy taken at begin, rollback target
//! ```

use crate::error::{StorageError, StorageResult};
use crate::snapshot::Snapshot;
use crate::storage::{Storage, TransactionState};
use fs2::FileExt;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// How the snapshot file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Open for reading only; writes are rejected.
    ReadOnly,
    /// Open for reading and in-place writing (the default).
    ReadWrite,
    /// Open write-only in append mode; reads fail at the OS level.
    Append,
}

impl AccessMode {
    fn writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadOnly => f.write_str("read-only"),
            AccessMode::ReadWrite => f.write_str("read-write"),
            AccessMode::Append => f.write_str("append"),
        }
    }
}

/// Configuration for opening a [`FileStorage`].
#[derive(Debug, Clone)]
pub struct FileConfig {
    /// Whether to create missing parent directories of the snapshot file.
    pub create_dirs: bool,

    /// How to open the snapshot file.
    pub access_mode: AccessMode,

    /// Pretty-print indentation width. `None` writes compact JSON.
    pub indent: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            create_dirs: false,
            access_mode: AccessMode::ReadWrite,
            indent: None,
        }
    }
}

impl FileConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create missing parent directories.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }

    /// Sets the access mode.
    #[must_use]
    pub const fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Pretty-prints the snapshot with the given indentation width.
    #[must_use]
    pub const fn indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }
}

/// A file-backed storage.
///
/// The snapshot file is opened once at construction and the handle is kept
/// for the instance's lifetime. Transactions take a blocking exclusive lock
/// on `<path>.lock` and copy the file to `<path>.backup`; rollback restores
/// that copy. Other processes calling [`Storage::begin`] on the same path
/// block until the lock is released.
///
/// # Example
///
/// ```no_run
/// use leafdb_storage::{FileStorage, Storage, StorageExt};
///
/// let mut storage = FileStorage::open("db.json")?;
/// storage.transaction(|s| {
///     let snapshot = s.read()?.unwrap_or_default();
///     s.write(&snapshot)
/// })?;
/// storage.close()?;
/// # Ok::<(), leafdb_storage::StorageError>(())
/// ```
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    config: FileConfig,
    handle: Option<File>,
    lock_file: Option<File>,
    txn: TransactionState,
}

impl FileStorage {
    /// Opens or creates a file storage at the given path with defaults.
    ///
    /// The file is created (empty) if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, FileConfig::default())
    }

    /// Opens a file storage with custom configuration.
    ///
    /// With a writable access mode the file is touched first: created if
    /// absent (along with missing parent directories when
    /// [`FileConfig::create_dirs`] is set) without modifying existing
    /// content. With [`AccessMode::ReadOnly`] the file must already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_config(path: impl AsRef<Path>, config: FileConfig) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if config.access_mode.writable() {
            touch(&path, config.create_dirs)?;
        }

        let handle = open_snapshot_file(&path, config.access_mode)?;

        Ok(Self {
            path,
            config,
            handle: Some(handle),
            lock_file: None,
            txn: TransactionState::default(),
        })
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        path_with_suffix(&self.path, ".lock")
    }

    fn backup_path(&self) -> PathBuf {
        path_with_suffix(&self.path, ".backup")
    }

    /// Blocks until the exclusive lock on `<path>.lock` is held.
    ///
    /// The lock file is created lazily on the first transaction and its
    /// handle is kept for reuse; only the OS-level lock is released between
    /// transactions.
    fn acquire_lock(&mut self) -> StorageResult<()> {
        if self.lock_file.is_none() {
            let lock = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.lock_path())?;
            self.lock_file = Some(lock);
        }
        if let Some(lock) = &self.lock_file {
            lock.lock_exclusive()?;
        }
        tracing::debug!("acquired lock on {}", self.lock_path().display());
        Ok(())
    }

    fn release_lock(&mut self) -> StorageResult<()> {
        if let Some(lock) = &self.lock_file {
            FileExt::unlock(lock)?;
            tracing::debug!("released lock on {}", self.lock_path().display());
        }
        Ok(())
    }

    fn begin_inner(&mut self) -> StorageResult<()> {
        self.acquire_lock()?;

        // The backup's existence, not its content, marks the rollback
        // target: an empty snapshot file still produces a backup file.
        if let Err(copy_err) = fs::copy(&self.path, self.backup_path()) {
            if let Err(unlock_err) = self.release_lock() {
                tracing::warn!(
                    "failed to release lock after backup copy error: {}",
                    unlock_err
                );
            }
            return Err(copy_err.into());
        }

        tracing::debug!("began transaction on {}", self.path.display());
        Ok(())
    }

    fn commit_inner(&mut self) -> StorageResult<()> {
        let handle = self.handle.as_mut().ok_or(StorageError::Closed)?;
        handle.flush()?;
        handle.sync_all()?;
        self.discard_backup_and_unlock()?;
        tracing::debug!("committed transaction on {}", self.path.display());
        Ok(())
    }

    fn rollback_inner(&mut self) -> StorageResult<()> {
        let restored = self.restore_backup();

        // Backup removal and lock release happen even when restoration
        // failed partway; the restoration error wins over a cleanup error.
        let cleanup = self.discard_backup_and_unlock();

        if restored.is_ok() {
            tracing::debug!("rolled back transaction on {}", self.path.display());
        }
        restored.and(cleanup)
    }

    fn restore_backup(&mut self) -> StorageResult<()> {
        // Close the current handle before replacing the file underneath it.
        self.handle = None;
        fs::copy(self.backup_path(), &self.path)?;
        self.handle = Some(open_snapshot_file(&self.path, self.config.access_mode)?);
        Ok(())
    }

    fn discard_backup_and_unlock(&mut self) -> StorageResult<()> {
        let backup = self.backup_path();
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        self.release_lock()
    }
}

impl Storage for FileStorage {
    fn read(&mut self) -> StorageResult<Option<Snapshot>> {
        let handle = self.handle.as_mut().ok_or(StorageError::Closed)?;

        // A zero-byte file means nothing has ever been written; a file
        // containing `{}` is an empty snapshot, which is different.
        let size = handle.seek(SeekFrom::End(0))?;
        if size == 0 {
            return Ok(None);
        }

        handle.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        handle.read_to_string(&mut contents)?;

        let snapshot = serde_json::from_str(&contents)?;
        Ok(Some(snapshot))
    }

    fn write(&mut self, snapshot: &Snapshot) -> StorageResult<()> {
        if !self.config.access_mode.writable() {
            return Err(StorageError::ReadOnly {
                mode: self.config.access_mode,
            });
        }

        let serialized = serialize_snapshot(snapshot, self.config.indent)?;
        let handle = self.handle.as_mut().ok_or(StorageError::Closed)?;

        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(&serialized)?;
        handle.flush()?;
        handle.sync_all()?;

        // Shrink the file to the new content: a shorter snapshot must not
        // leave trailing bytes of the previous one behind.
        let end = handle.stream_position()?;
        handle.set_len(end)?;

        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.handle = None;
        Ok(())
    }

    fn begin(&mut self) -> StorageResult<()> {
        self.txn.begin()?;
        if let Err(err) = self.begin_inner() {
            self.txn.clear();
            return Err(err);
        }
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.txn.require_active()?;
        let result = self.commit_inner();
        self.txn.clear();
        result
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.txn.require_active()?;
        let result = self.rollback_inner();
        self.txn.clear();
        result
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_active()
    }
}

/// Creates a file if it doesn't exist yet without modifying its content,
/// optionally creating missing parent directories first.
fn touch(path: &Path, create_dirs: bool) -> StorageResult<()> {
    if create_dirs {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().append(true).create(true).open(path)?;
    Ok(())
}

fn open_snapshot_file(path: &Path, mode: AccessMode) -> StorageResult<File> {
    let file = match mode {
        AccessMode::ReadOnly => OpenOptions::new().read(true).open(path)?,
        AccessMode::ReadWrite => OpenOptions::new().read(true).write(true).open(path)?,
        AccessMode::Append => OpenOptions::new().append(true).open(path)?,
    };
    Ok(file)
}

/// Appends `suffix` to the full file name, e.g. `db.json` -> `db.json.lock`.
fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn serialize_snapshot(snapshot: &Snapshot, indent: Option<usize>) -> StorageResult<Vec<u8>> {
    let mut buffer = Vec::new();
    match indent {
        None => serde_json::to_writer(&mut buffer, snapshot)?,
        Some(width) => {
            let indent = vec![b' '; width];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            snapshot.serialize(&mut serializer)?;
        }
    }
    Ok(buffer)
}
