//! The snapshot data model shared by all storage backends.
//!
//! A snapshot is the full database state at one instant: a mapping from
//! table name to a table, where a table maps record ids to records. Records
//! are arbitrary JSON objects; the storage layer never interprets them.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single record: string keys mapped to arbitrary JSON values.
pub type Document = Map<String, Value>;

/// A named record collection within a snapshot: record id -> record.
pub type Table = BTreeMap<String, Document>;

/// The full database state: table name -> table.
///
/// `BTreeMap` keeps the serialized form deterministic, so writing the same
/// snapshot twice produces byte-identical files.
pub type Snapshot = BTreeMap<String, Table>;
