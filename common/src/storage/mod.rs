//! Storage abstraction shared by revlog components.
//!
//! The traits here model an ordered key-value store with atomic batch writes.
//! On top of plain writes, [`Storage::write_if`] provides a compare-and-set
//! batch: every [`Precondition`] is checked and, only if all hold, the batch
//! is applied as one unit. Optimistic transactions in the `revlog` crate are
//! built entirely on this primitive.

pub mod config;
pub mod factory;
pub mod in_memory;
pub mod slate;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;

/// A key-value pair stored in or read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Options for write operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Wait for the write to be durable before returning.
    pub await_durable: bool,
}

/// Expected state of a single key at the moment a conditional write applies.
///
/// `expected == None` asserts the key is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub key: Bytes,
    pub expected: Option<Bytes>,
}

impl Precondition {
    pub fn new(key: Bytes, expected: Option<Bytes>) -> Self {
        Self { key, expected }
    }

    /// Asserts that `key` does not exist yet.
    pub fn absent(key: Bytes) -> Self {
        Self {
            key,
            expected: None,
        }
    }

    /// Returns true if `current` satisfies this precondition.
    pub fn holds(&self, current: Option<&Bytes>) -> bool {
        self.expected.as_ref() == current
    }
}

/// Outcome of [`Storage::write_if`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// All preconditions held and the batch was applied.
    Applied,
    /// The precondition on `key` failed; nothing was written.
    Conflict { key: Bytes },
}

/// Errors raised by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend failure (I/O, object store, corruption).
    Storage(String),
    /// Invariant violation inside a backend.
    Internal(String),
}

impl StorageError {
    /// Wraps any displayable backend error.
    pub fn from_storage(err: impl std::fmt::Display) -> Self {
        StorageError::Storage(err.to_string())
    }
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Forward iterator over records in key order.
#[async_trait]
pub trait StorageIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>>;
}

/// Read operations over an ordered key space.
#[async_trait]
pub trait StorageRead: Send + Sync {
    /// Returns the record stored at `key`, if any.
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>>;

    /// Returns an iterator over all records whose keys fall in `range`, in
    /// ascending key order.
    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>>;
}

/// Read-write storage with atomic batches.
#[async_trait]
pub trait Storage: StorageRead {
    /// Writes `records` as one atomic batch without preconditions.
    async fn put(&self, records: Vec<Record>) -> StorageResult<()>;

    /// Checks every precondition and, if all hold, writes `records` as one
    /// atomic batch. Checking and writing are serialized against every other
    /// write to this storage.
    async fn write_if(
        &self,
        preconditions: Vec<Precondition>,
        records: Vec<Record>,
        options: WriteOptions,
    ) -> StorageResult<WriteOutcome>;

    /// Flushes buffered writes to durable storage.
    async fn flush(&self) -> StorageResult<()>;

    /// Flushes and releases the backend.
    async fn close(&self) -> StorageResult<()>;
}

/// Upcasts a read-write storage handle to a read-only one.
pub fn as_read(storage: &Arc<dyn Storage>) -> Arc<dyn StorageRead> {
    Arc::clone(storage) as Arc<dyn StorageRead>
}
