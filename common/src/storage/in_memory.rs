//! In-memory storage backend.
//!
//! Backed by a `BTreeMap` behind a single lock. Every write, conditional or
//! not, holds the write lock for its whole duration, so conditional batches
//! are linearizable with respect to each other and to plain writes.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;
use crate::storage::{
    Precondition, Record, Storage, StorageError, StorageIterator, StorageRead,
    StorageResult, WriteOptions, WriteOutcome,
};

/// Volatile storage for tests and single-process use.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: RwLock<BTreeMap<Bytes, Bytes>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, BTreeMap<Bytes, Bytes>>> {
        self.data
            .read()
            .map_err(|_| StorageError::Internal("in-memory storage lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, BTreeMap<Bytes, Bytes>>> {
        self.data
            .write()
            .map_err(|_| StorageError::Internal("in-memory storage lock poisoned".to_string()))
    }
}

/// Iterator over a snapshot of the scanned range.
struct InMemoryIterator {
    records: std::vec::IntoIter<Record>,
}

#[async_trait]
impl StorageIterator for InMemoryIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        Ok(self.records.next())
    }
}

#[async_trait]
impl StorageRead for InMemoryStorage {
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let data = self.read()?;
        Ok(data.get(&key).map(|v| Record::new(key.clone(), v.clone())))
    }

    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        // BTreeMap::range panics on inverted bounds.
        let records = if range.is_empty() {
            Vec::new()
        } else {
            let data = self.read()?;
            data.range(range)
                .map(|(k, v)| Record::new(k.clone(), v.clone()))
                .collect()
        };
        Ok(Box::new(InMemoryIterator {
            records: records.into_iter(),
        }))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, records: Vec<Record>) -> StorageResult<()> {
        let mut data = self.write()?;
        for record in records {
            data.insert(record.key, record.value);
        }
        Ok(())
    }

    async fn write_if(
        &self,
        preconditions: Vec<Precondition>,
        records: Vec<Record>,
        _options: WriteOptions,
    ) -> StorageResult<WriteOutcome> {
        let mut data = self.write()?;
        for precondition in preconditions {
            if !precondition.holds(data.get(&precondition.key)) {
                return Ok(WriteOutcome::Conflict {
                    key: precondition.key,
                });
            }
        }
        for record in records {
            data.insert(record.key, record.value);
        }
        Ok(WriteOutcome::Applied)
    }

    async fn flush(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
