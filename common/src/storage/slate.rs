use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use slatedb::config::{ScanOptions, WriteOptions as SlateDbWriteOptions};
use slatedb::{Db, DbIterator, WriteBatch};
use tokio::sync::Mutex;

use crate::{
    BytesRange, Record, StorageError, StorageIterator, StorageRead, StorageResult,
    storage::{Precondition, Storage, WriteOptions, WriteOutcome},
};

/// Returns the default scan options used for storage scans.
fn default_scan_options() -> ScanOptions {
    ScanOptions {
        read_ahead_bytes: 1024 * 1024,
        cache_blocks: true,
        max_fetch_tasks: 4,
        ..ScanOptions::default()
    }
}

/// SlateDB-backed implementation of the Storage trait.
///
/// SlateDB is an embedded key-value store built on object storage, providing
/// LSM-tree semantics with cloud-native durability. A database has exactly one
/// writer (others are fenced), so serializing writes behind `write_lock` is
/// enough to make [`Storage::write_if`] a true compare-and-set.
pub struct SlateDbStorage {
    db: Arc<Db>,
    write_lock: Mutex<()>,
}

impl SlateDbStorage {
    /// Creates a new SlateDbStorage instance wrapping the given SlateDB database.
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    async fn write_batch(&self, batch: WriteBatch, options: WriteOptions) -> StorageResult<()> {
        let slate_options = SlateDbWriteOptions {
            await_durable: options.await_durable,
        };
        self.db
            .write_with_options(batch, &slate_options)
            .await
            .map_err(StorageError::from_storage)
    }
}

#[async_trait]
impl StorageRead for SlateDbStorage {
    /// Retrieves a single record by key from SlateDB.
    ///
    /// Returns `None` if the key does not exist.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes) -> StorageResult<Option<Record>> {
        let value = self
            .db
            .get(&key)
            .await
            .map_err(StorageError::from_storage)?;

        match value {
            Some(v) => Ok(Some(Record::new(key, v))),
            None => Ok(None),
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn scan_iter(
        &self,
        range: BytesRange,
    ) -> StorageResult<Box<dyn StorageIterator + Send + 'static>> {
        // SlateDB asserts that scan ranges are non-empty.
        if range.is_empty() {
            return Ok(Box::new(EmptyIterator));
        }
        let iter = self
            .db
            .scan_with_options(range, &default_scan_options())
            .await
            .map_err(StorageError::from_storage)?;
        Ok(Box::new(SlateDbIterator { iter }))
    }
}

struct SlateDbIterator {
    iter: DbIterator,
}

struct EmptyIterator;

#[async_trait]
impl StorageIterator for EmptyIterator {
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        Ok(None)
    }
}

#[async_trait]
impl StorageIterator for SlateDbIterator {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn next(&mut self) -> StorageResult<Option<Record>> {
        match self.iter.next().await.map_err(StorageError::from_storage)? {
            Some(entry) => Ok(Some(Record::new(entry.key, entry.value))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Storage for SlateDbStorage {
    async fn put(&self, records: Vec<Record>) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        for record in records {
            batch.put(record.key, record.value);
        }
        let _guard = self.write_lock.lock().await;
        self.write_batch(batch, WriteOptions::default()).await
    }

    #[tracing::instrument(level = "trace", skip_all, fields(preconditions = preconditions.len()))]
    async fn write_if(
        &self,
        preconditions: Vec<Precondition>,
        records: Vec<Record>,
        options: WriteOptions,
    ) -> StorageResult<WriteOutcome> {
        let _guard = self.write_lock.lock().await;
        for precondition in preconditions {
            let current = self
                .db
                .get(&precondition.key)
                .await
                .map_err(StorageError::from_storage)?;
            if !precondition.holds(current.as_ref()) {
                return Ok(WriteOutcome::Conflict {
                    key: precondition.key,
                });
            }
        }

        let mut batch = WriteBatch::new();
        for record in records {
            batch.put(record.key, record.value);
        }
        self.write_batch(batch, options).await?;
        Ok(WriteOutcome::Applied)
    }

    async fn flush(&self) -> StorageResult<()> {
        self.db.flush().await.map_err(StorageError::from_storage)?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.db.close().await.map_err(StorageError::from_storage)?;
        Ok(())
    }
}
