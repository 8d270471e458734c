//! Commit log storage wrappers.
//!
//! This module provides [`LogStorage`] and [`LogStorageRead`], which wrap the
//! underlying storage traits with typed access to logs, commits and shards
//! plus the paged scans the read views are built from.

use std::ops::{Bound, Range};
use std::sync::Arc;

use common::{BytesRange, Precondition, Record, Storage, StorageRead, WriteOptions, WriteOutcome};

use crate::error::{Error, Result};
use crate::model::{Commit, CommitKey, LogName, LogState, Revision, RevisionShard, ShardTag};
use crate::query::{CommitQuery, Cursor, Page, PageRequest};
use crate::serde::{
    RecordType, deserialize_commit, deserialize_log_state, deserialize_shard, log_key,
    serialize_log_state,
};

/// Read-only commit log storage operations.
#[derive(Clone)]
pub(crate) struct LogStorageRead {
    storage: Arc<dyn StorageRead>,
}

impl LogStorageRead {
    pub(crate) fn new(storage: Arc<dyn StorageRead>) -> Self {
        Self { storage }
    }

    /// Loads the state of a log, or `None` if it was never created.
    pub(crate) async fn get_log(&self, log: &LogName) -> Result<Option<LogState>> {
        match self.storage.get(log_key(log)).await? {
            Some(record) => Ok(Some(deserialize_log_state(log.clone(), &record.value)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn require_log(&self, log: &LogName) -> Result<LogState> {
        self.get_log(log)
            .await?
            .ok_or_else(|| Error::NotFound(format!("log {}", log)))
    }

    pub(crate) async fn get_commit(&self, key: &CommitKey) -> Result<Option<Commit>> {
        match self.storage.get(key.serialize()).await? {
            Some(record) => Ok(Some(deserialize_commit(&record)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn get_shard(&self, tag: &ShardTag) -> Result<Option<RevisionShard>> {
        match self.storage.get(tag.serialize()).await? {
            Some(record) => Ok(Some(deserialize_shard(tag.clone(), &record.value)?)),
            None => Ok(None),
        }
    }

    /// Executes a commit query against one log.
    ///
    /// `revisions` overrides the query's own range so callers can apply a
    /// cap such as the log's latest revision.
    pub(crate) async fn query_commits(
        &self,
        log: &LogName,
        query: &CommitQuery,
        revisions: Range<Revision>,
        default_limit: usize,
    ) -> Result<Page<Commit>> {
        let range = CommitKey::scan_range(log, &revisions);
        self.scan_page(RecordType::Commit, log, range, &query.page, default_limit, |record| {
            let commit = deserialize_commit(record)?;
            Ok(query.matches_applied(commit.applied).then_some(commit))
        })
        .await
    }

    /// Lists the distinct revisions of a log's commits in ascending order.
    pub(crate) async fn scan_revisions(
        &self,
        log: &LogName,
        revisions: Range<Revision>,
        page: &PageRequest,
        default_limit: usize,
    ) -> Result<Page<Revision>> {
        let range = CommitKey::scan_range(log, &revisions);
        let mut last = None;
        self.scan_page(RecordType::Commit, log, range, page, default_limit, |record| {
            let key = CommitKey::deserialize(&record.key)?;
            if last == Some(key.revision) {
                return Ok(None);
            }
            last = Some(key.revision);
            Ok(Some(key.revision))
        })
        .await
    }

    /// Lists a log's shards ordered by revision.
    pub(crate) async fn scan_shards(
        &self,
        log: &LogName,
        page: &PageRequest,
        default_limit: usize,
    ) -> Result<Page<RevisionShard>> {
        let range = ShardTag::scan_range(log, &(0..Revision::MAX));
        self.scan_page(RecordType::Shard, log, range, page, default_limit, |record| {
            let tag = ShardTag::deserialize(&record.key)?;
            Ok(Some(deserialize_shard(tag, &record.value)?))
        })
        .await
    }

    /// Scans one page of `range`.
    ///
    /// `decode` returns `None` for records the view filters out. One match
    /// beyond the limit is read so its key can become the next cursor.
    async fn scan_page<T>(
        &self,
        record_type: RecordType,
        log: &LogName,
        range: BytesRange,
        page: &PageRequest,
        default_limit: usize,
        mut decode: impl FnMut(&Record) -> Result<Option<T>>,
    ) -> Result<Page<T>> {
        let limit = page.resolve_limit(default_limit)?;
        let range = match page.cursor.clone() {
            Some(cursor) => resume_range(record_type, log, range, cursor)?,
            None => range,
        };

        let mut iter = self.storage.scan_iter(range).await?;
        let mut items = Vec::new();
        while let Some(record) = iter.next().await? {
            let Some(item) = decode(&record)? else {
                continue;
            };
            if items.len() == limit {
                return Ok(Page {
                    items,
                    next: Some(Cursor::from_bytes(record.key)),
                });
            }
            items.push(item);
        }
        Ok(Page { items, next: None })
    }
}

/// Moves the start of `range` up to `cursor`, inclusive.
fn resume_range(
    record_type: RecordType,
    log: &LogName,
    range: BytesRange,
    cursor: Cursor,
) -> Result<BytesRange> {
    let key = cursor.into_key();
    if !BytesRange::prefix(record_type.log_prefix(log)).contains_key(&key) {
        return Err(Error::InvalidInput(format!(
            "cursor does not belong to a {:?} view of log {}",
            record_type, log
        )));
    }
    let (start, end) = range.into_bounds();
    let start = match start {
        Bound::Included(s) if s > key => Bound::Included(s),
        Bound::Excluded(s) if s >= key => Bound::Excluded(s),
        _ => Bound::Included(key),
    };
    Ok(BytesRange::new(start, end))
}

/// Read-write commit log storage operations.
#[derive(Clone)]
pub(crate) struct LogStorage {
    storage: Arc<dyn Storage>,
}

impl LogStorage {
    pub(crate) fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Creates a new log storage with an in-memory backend.
    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        use common::storage::in_memory::InMemoryStorage;
        Self::new(Arc::new(InMemoryStorage::new()))
    }

    /// Returns a read-only view of this storage.
    pub(crate) fn as_read(&self) -> LogStorageRead {
        LogStorageRead::new(common::storage::as_read(&self.storage))
    }

    /// The underlying storage, for transactions.
    pub(crate) fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// Persists a new log, failing if the name is taken.
    pub(crate) async fn create_log(&self, state: &LogState) -> Result<()> {
        let key = log_key(&state.name);
        let outcome = self
            .storage
            .write_if(
                vec![Precondition::absent(key.clone())],
                vec![Record::new(key, serialize_log_state(state))],
                WriteOptions::default(),
            )
            .await?;
        match outcome {
            WriteOutcome::Applied => Ok(()),
            WriteOutcome::Conflict { .. } => Err(Error::InvalidInput(format!(
                "log {} already exists",
                state.name
            ))),
        }
    }

    /// Writes raw records. Only used to seed fixtures.
    #[cfg(test)]
    pub(crate) async fn put(&self, records: Vec<Record>) -> Result<()> {
        self.storage.put(records).await?;
        Ok(())
    }

    pub(crate) async fn flush(&self) -> Result<()> {
        self.storage.flush().await?;
        Ok(())
    }

    pub(crate) async fn close(&self) -> Result<()> {
        self.storage.close().await?;
        Ok(())
    }
}
