//! Test fixtures shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use common::storage::in_memory::InMemoryStorage;
use common::{
    BytesRange, Precondition, Record, Storage, StorageIterator, StorageRead,
    StorageResult, WriteOptions, WriteOutcome,
};

/// Storage wrapper that injects conflicts into conditional writes.
///
/// A conditional write whose preconditions mention a contended key fails
/// with [`WriteOutcome::Conflict`] without touching the inner storage, as if
/// a concurrent writer had changed that key first. Each injected conflict is
/// consumed after one use.
#[derive(Default)]
pub(crate) struct ContendedStorage {
    inner: InMemoryStorage,
    contended: Mutex<HashMap<Bytes, usize>>,
}

impl ContendedStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` conditional writes that read `key` conflict.
    pub(crate) fn contend(&self, key: Bytes, times: usize) {
        *self.contended.lock().unwrap().entry(key).or_default() += times;
    }

    /// Conflicts still waiting to be injected for `key`.
    pub(crate) fn pending(&self, key: &Bytes) -> usize {
        self.contended.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn take_conflict(&self, preconditions: &[Precondition]) -> Option<Bytes> {
        let mut contended = self.contended.lock().unwrap();
        for precondition in preconditions {
            match contended.get_mut(&precondition.key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    return Some(precondition.key.clone());
                }
                _ => {}
            }
        }
        None
    }
}

#[async_trait]
impl StorageRead for ContendedStorage {
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        self.inner.get(key).await
    }

    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        self.inner.scan_iter(range).await
    }
}

#[async_trait]
impl Storage for ContendedStorage {
    async fn put(&self, records: Vec<Record>) -> StorageResult<()> {
        self.inner.put(records).await
    }

    async fn write_if(
        &self,
        preconditions: Vec<Precondition>,
        records: Vec<Record>,
        options: WriteOptions,
    ) -> StorageResult<WriteOutcome> {
        if let Some(key) = self.take_conflict(&preconditions) {
            return Ok(WriteOutcome::Conflict { key });
        }
        self.inner.write_if(preconditions, records, options).await
    }

    async fn flush(&self) -> StorageResult<()> {
        self.inner.flush().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}
