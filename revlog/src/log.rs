//! Core commit log implementation with read and write APIs.
//!
//! This module provides [`CommitLogDb`], the entry point that owns the
//! storage handle, and [`Log`], the aggregate root for one named log. `Log`
//! exposes commit creation and consumer mutations, plus the read views via
//! the [`LogRead`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::clock::{Clock, SystemClock};
use common::storage::factory::create_storage;
use common::{Storage, WriteOptions};

use crate::allocator::{Allocation, RevisionAllocator};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Commit, CommitKey, LogName, LogState, Revision, RevisionShard};
use crate::query::{CommitQuery, Page, PageRequest};
use crate::reader::{LogRead, LogReader, LogView};
use crate::serde::{deserialize_commit, deserialize_log_state, log_key, serialize_commit, serialize_log_state};
use crate::shard::{ShardCommits, ShardFallback};
use crate::storage::LogStorage;
use crate::txn::Transaction;

/// A store of revisioned commit logs.
///
/// # Example
///
/// ```ignore
/// use revlog::{CommitLogDb, Config, LogRead, PageRequest};
///
/// let db = CommitLogDb::open(Config::default()).await?;
/// let log = db.create_log("orders").await?;
/// log.new_commit("order-123").await?;
///
/// let commits = log.commits(PageRequest::first()).await?;
/// ```
pub struct CommitLogDb {
    storage: LogStorage,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl CommitLogDb {
    /// Opens the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be initialized.
    pub async fn open(config: Config) -> Result<Self> {
        let storage = create_storage(&config.storage).await?;
        Ok(Self::with_storage(storage, Arc::new(SystemClock), config))
    }

    /// Builds a store on an existing storage handle and clock.
    ///
    /// `config.storage` is ignored.
    pub fn with_storage(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            storage: LogStorage::new(storage),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates a new, empty log.
    ///
    /// Fails with [`Error::InvalidInput`] if the name is empty or already
    /// taken.
    pub async fn create_log(&self, name: impl Into<LogName>) -> Result<Log> {
        let name = name.into();
        if name.as_str().is_empty() {
            return Err(Error::InvalidInput("log name must not be empty".to_string()));
        }
        let state = LogState::new(name.clone(), self.clock.now_ms());
        self.storage.create_log(&state).await?;
        tracing::debug!(log = %name, "created log");
        Ok(self.handle(name))
    }

    /// Opens a handle to an existing log.
    pub async fn log(&self, name: impl Into<LogName>) -> Result<Log> {
        let name = name.into();
        self.storage.as_read().require_log(&name).await?;
        Ok(self.handle(name))
    }

    /// Opens a read-only view of an existing log.
    pub async fn reader(&self, name: impl Into<LogName>) -> Result<LogReader> {
        let name = name.into();
        self.storage.as_read().require_log(&name).await?;
        Ok(LogReader::from_view(self.view(name)))
    }

    /// Resolves the log that owns `commit`.
    pub async fn parent_of(&self, commit: &Commit) -> Result<Log> {
        self.log(commit.parent().clone()).await
    }

    /// The revision allocator bound to this store.
    pub fn allocator(&self) -> RevisionAllocator {
        RevisionAllocator::new(self.storage.storage(), Arc::clone(&self.clock))
    }

    /// The shard fallback bound to this store.
    pub fn fallback(&self) -> ShardFallback {
        ShardFallback::new(
            self.storage.storage(),
            Arc::clone(&self.clock),
            &self.config.fallback,
        )
    }

    pub async fn flush(&self) -> Result<()> {
        self.storage.flush().await
    }

    /// Flushes and closes the underlying storage.
    pub async fn close(&self) -> Result<()> {
        self.storage.close().await
    }

    fn view(&self, name: LogName) -> LogView {
        LogView::new(name, self.storage.as_read(), self.config.page_size)
    }

    fn handle(&self, name: LogName) -> Log {
        Log {
            view: self.view(name),
            storage: self.storage.clone(),
            clock: Arc::clone(&self.clock),
            allocator: self.allocator(),
            fallback: self.fallback(),
        }
    }
}

/// Handle to one log: the aggregate root for its commits.
///
/// Handles are cheap to clone and may be moved into concurrent tasks. They
/// hold no in-process state beyond the storage handle, so any number of
/// handles to one log can write concurrently.
#[derive(Clone)]
pub struct Log {
    view: LogView,
    storage: LogStorage,
    clock: Arc<dyn Clock>,
    allocator: RevisionAllocator,
    fallback: ShardFallback,
}

impl Log {
    pub fn name(&self) -> &LogName {
        self.view.name()
    }

    /// Records `data` as a new commit.
    ///
    /// The commit normally receives the next revision from the allocator. If
    /// a concurrent writer wins the race for that revision, the commit is
    /// deposited into the shard for the attempted revision instead. The
    /// fallback is transparent: either way a stored commit is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the log no longer exists.
    /// - [`Error::Contention`] only if the shard deposit itself kept losing
    ///   races (see [`FallbackConfig`](crate::FallbackConfig)).
    pub async fn new_commit(&self, data: impl Into<Bytes>) -> Result<Commit> {
        let data = data.into();
        match self.allocator.allocate_commit(self.name(), data.clone()).await? {
            Allocation::Granted(commit) => Ok(commit),
            Allocation::Contended { attempted } => {
                tracing::debug!(
                    log = %self.name(),
                    attempted,
                    "falling back to revision shard"
                );
                self.fallback.deposit(self.name(), attempted, data).await
            }
        }
    }

    /// Marks a commit of this log as applied by the downstream consumer.
    ///
    /// Marking an already applied commit is a no-op.
    pub async fn mark_applied(&self, key: &CommitKey) -> Result<Commit> {
        self.view.ensure_owned(key)?;
        let mut txn = Transaction::begin(self.storage.storage(), format!("commit {}", key.id));
        let storage_key = key.serialize();
        let value = txn.get(storage_key.clone()).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "commit {} at revision {} of log {}",
                key.id, key.revision, key.log
            ))
        })?;
        let mut commit = deserialize_commit(&common::Record::new(storage_key, value))?;
        if commit.applied {
            return Ok(commit);
        }

        commit.applied = true;
        commit.updated_ms = self.clock.now_ms();
        let record = serialize_commit(&commit);
        txn.put(record.key, record.value);
        txn.commit(WriteOptions::default()).await?;
        Ok(commit)
    }

    /// Records that the consumer has applied every commit up to `revision`.
    ///
    /// Fails with [`Error::InvalidInput`] if `revision` moves backwards or
    /// is above the latest revision.
    pub async fn advance_applied_revision(&self, revision: Revision) -> Result<LogState> {
        let mut txn = Transaction::begin(self.storage.storage(), format!("log {}", self.name()));
        let key = log_key(self.name());
        let value = txn
            .get(key.clone())
            .await?
            .ok_or_else(|| Error::NotFound(format!("log {}", self.name())))?;
        let mut state = deserialize_log_state(self.name().clone(), &value)?;

        if revision > state.latest_revision {
            return Err(Error::InvalidInput(format!(
                "applied revision {} is above latest revision {}",
                revision, state.latest_revision
            )));
        }
        match state.applied_revision {
            Some(current) if revision < current => {
                return Err(Error::InvalidInput(format!(
                    "applied revision cannot move backwards from {} to {}",
                    current, revision
                )));
            }
            _ => {}
        }

        state.applied_revision = Some(revision);
        state.updated_ms = self.clock.now_ms();
        txn.put(key, serialize_log_state(&state));
        txn.commit(WriteOptions::default()).await?;
        Ok(state)
    }
}

#[async_trait]
impl LogRead for Log {
    fn name(&self) -> &LogName {
        self.view.name()
    }

    async fn state(&self) -> Result<LogState> {
        self.view.state().await
    }

    async fn commit(&self, key: &CommitKey) -> Result<Commit> {
        self.view.commit(key).await
    }

    async fn query(&self, query: CommitQuery) -> Result<Page<Commit>> {
        self.view.query(&query).await
    }

    async fn commits(&self, page: PageRequest) -> Result<Page<Commit>> {
        self.view.commits(page).await
    }

    async fn revisions(&self, page: PageRequest) -> Result<Page<Revision>> {
        self.view.revisions(page).await
    }

    async fn revision_shards(&self, page: PageRequest) -> Result<Page<RevisionShard>> {
        self.view.revision_shards(page).await
    }

    async fn shard(&self, revision: Revision) -> Result<RevisionShard> {
        self.view.shard(revision).await
    }

    fn shard_commits(&self, shard: &RevisionShard) -> ShardCommits {
        self.view.shard_commits(shard)
    }
}
