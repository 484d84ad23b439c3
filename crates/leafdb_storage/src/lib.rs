//! # LeafDB Storage
//!
//! Snapshot storage trait and backends for LeafDB.
//!
//! This crate is the persistence layer of LeafDB. A [`Storage`] reads and
//! writes the database as one [`Snapshot`] (a mapping of named tables to
//! record collections) and layers begin/commit/rollback transactions over
//! media that are not natively transactional. The higher-level document
//! API consumes a `Storage` without knowing its implementation.
//!
//! ## Design Principles
//!
//! - Every write replaces the whole snapshot; there are no partial updates
//! - Transactions are exclusive: the file backend takes a blocking
//!   advisory lock for the duration of the transaction
//! - Rollback restores the last known-good snapshot from a backup taken
//!   at transaction start; there are no stronger crash guarantees
//!
//! ## Available Backends
//!
//! - [`FileStorage`] - a single JSON file, with `.lock` and `.backup`
//!   companion files for transactions
//! - [`MemoryStorage`] - in-process, for tests and ephemeral databases
//!
//! ## Example
//!
//! ```rust
//! use leafdb_storage::{MemoryStorage, Snapshot, Storage, StorageExt, Table};
//!
//! let mut storage = MemoryStorage::new();
//!
//! let mut snapshot = Snapshot::new();
//! snapshot.insert("users".to_string(), Table::new());
//! storage.transaction(|s| s.write(&snapshot))?;
//!
//! assert_eq!(storage.read()?, Some(snapshot));
//! # Ok::<(), leafdb_storage::StorageError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod snapshot;
mod storage;

pub use error::{StorageError, StorageResult};
pub use file::{AccessMode, FileConfig, FileStorage};
pub use memory::MemoryStorage;
pub use snapshot::{Document, Snapshot, Table};
pub use storage::{Storage, StorageExt};
