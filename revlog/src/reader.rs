//! Read-only log access and the [`LogRead`] trait.
//!
//! This module provides:
//! - [`LogRead`]: the reconciliation views shared by [`Log`](crate::Log) and
//!   [`LogReader`].
//! - [`LogReader`]: a read-only view of one log.
//!
//! Commits reach storage through two paths: the revision allocator writes
//! them directly with a fresh revision, and the shard fallback writes them
//! with the revision the allocator attempted. Both are stored under the same
//! key space, so every view below reads them as one sequence ordered by
//! revision, then creation time, then commit id.

use std::sync::Arc;

use async_trait::async_trait;
use common::StorageRead;

use crate::error::{Error, Result};
use crate::model::{Commit, CommitKey, LogName, LogState, Revision, RevisionShard, ShardTag};
use crate::query::{CommitQuery, Page, PageRequest};
use crate::range::{cap_revision, closed_revision_range};
use crate::shard::ShardCommits;
use crate::storage::LogStorageRead;

/// Read operations on a single log.
///
/// # Implementors
///
/// - [`Log`](crate::Log): the log handle with write access.
/// - [`LogReader`]: a read-only view.
///
/// Every view is paged. A [`PageRequest`] without a limit uses the
/// configured page size.
///
/// # Example
///
/// ```ignore
/// use revlog::{LogRead, PageRequest};
///
/// async fn dump(reader: &impl LogRead) -> revlog::Result<()> {
///     let mut request = Some(PageRequest::first());
///     while let Some(page) = request {
///         let commits = reader.commits(page).await?;
///         for commit in &commits.items {
///             println!("{}: {:?}", commit.revision(), commit.data);
///         }
///         request = commits.next_request(None);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LogRead: Send + Sync {
    /// Name of the log this reader is bound to.
    fn name(&self) -> &LogName;

    /// Loads the current state of the log.
    async fn state(&self) -> Result<LogState>;

    /// Fetches a single commit of this log.
    async fn commit(&self, key: &CommitKey) -> Result<Commit>;

    /// Runs a typed commit query.
    async fn query(&self, query: CommitQuery) -> Result<Page<Commit>>;

    /// Commits with `revision <= latest_revision`.
    ///
    /// Sharded commits whose attempted revision is above the counter are not
    /// included; [`history`](LogRead::history) returns those as well.
    async fn commits(&self, page: PageRequest) -> Result<Page<Commit>>;

    /// Distinct revisions of this log's commits, ascending.
    async fn revisions(&self, page: PageRequest) -> Result<Page<Revision>>;

    /// Shards of this log, ordered by revision.
    async fn revision_shards(&self, page: PageRequest) -> Result<Page<RevisionShard>>;

    /// Fetches the shard for `revision`.
    async fn shard(&self, revision: Revision) -> Result<RevisionShard>;

    /// Lazy iterator over the members of `shard`.
    fn shard_commits(&self, shard: &RevisionShard) -> ShardCommits;

    /// Commits with revision in `[bottom, top]` whose applied flag equals
    /// `applied`, ascending.
    ///
    /// Fails with [`Error::InvalidInput`] when `bottom > top`.
    async fn commit_range(
        &self,
        bottom: Revision,
        top: Revision,
        applied: bool,
        page: PageRequest,
    ) -> Result<Page<Commit>> {
        closed_revision_range(bottom, top)?;
        self.query(
            CommitQuery::new()
                .revisions(bottom..=top)
                .applied(applied)
                .page(page),
        )
        .await
    }

    /// Unapplied commits at or above the consumer's applied revision.
    async fn uncommitted(&self, page: PageRequest) -> Result<Page<Commit>> {
        let state = self.state().await?;
        let from = state.applied_revision.unwrap_or(0);
        self.query(
            CommitQuery::new()
                .revisions(from..)
                .applied(false)
                .page(page),
        )
        .await
    }

    /// Every commit of this log from both write paths, regardless of the
    /// revision counter.
    async fn history(&self, page: PageRequest) -> Result<Page<Commit>> {
        self.query(CommitQuery::new().page(page)).await
    }
}

/// Shared implementation of the read views for one log.
#[derive(Clone)]
pub(crate) struct LogView {
    name: LogName,
    storage: LogStorageRead,
    page_size: usize,
}

impl LogView {
    pub(crate) fn new(name: LogName, storage: LogStorageRead, page_size: usize) -> Self {
        Self {
            name,
            storage,
            page_size,
        }
    }

    pub(crate) fn name(&self) -> &LogName {
        &self.name
    }

    pub(crate) async fn state(&self) -> Result<LogState> {
        self.storage.require_log(&self.name).await
    }

    pub(crate) async fn commit(&self, key: &CommitKey) -> Result<Commit> {
        self.ensure_owned(key)?;
        self.storage.get_commit(key).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "commit {} at revision {} of log {}",
                key.id, key.revision, key.log
            ))
        })
    }

    pub(crate) async fn query(&self, query: &CommitQuery) -> Result<Page<Commit>> {
        self.storage
            .query_commits(&self.name, query, query.revisions.clone(), self.page_size)
            .await
    }

    pub(crate) async fn commits(&self, page: PageRequest) -> Result<Page<Commit>> {
        let state = self.state().await?;
        let query = CommitQuery::new().page(page);
        let revisions = cap_revision(query.revisions.clone(), state.latest_revision);
        self.storage
            .query_commits(&self.name, &query, revisions, self.page_size)
            .await
    }

    pub(crate) async fn revisions(&self, page: PageRequest) -> Result<Page<Revision>> {
        self.storage
            .scan_revisions(&self.name, 0..Revision::MAX, &page, self.page_size)
            .await
    }

    pub(crate) async fn revision_shards(&self, page: PageRequest) -> Result<Page<RevisionShard>> {
        self.storage
            .scan_shards(&self.name, &page, self.page_size)
            .await
    }

    pub(crate) async fn shard(&self, revision: Revision) -> Result<RevisionShard> {
        let tag = ShardTag::new(self.name.clone(), revision);
        self.storage
            .get_shard(&tag)
            .await?
            .ok_or_else(|| Error::NotFound(format!("shard {}", tag)))
    }

    pub(crate) fn shard_commits(&self, shard: &RevisionShard) -> ShardCommits {
        ShardCommits::new(self.storage.clone(), shard.commit_keys.clone())
    }

    pub(crate) fn ensure_owned(&self, key: &CommitKey) -> Result<()> {
        if key.log != self.name {
            return Err(Error::InvalidInput(format!(
                "commit belongs to log {}, not {}",
                key.log, self.name
            )));
        }
        Ok(())
    }
}

/// A read-only view of one log.
///
/// `LogReader` exposes the [`LogRead`] views without any write access. Use
/// it for downstream consumers that reconcile commits but must never create
/// them.
///
/// # Example
///
/// ```ignore
/// use revlog::{CommitLogDb, LogRead, PageRequest};
///
/// let reader = db.reader("orders").await?;
/// let pending = reader.uncommitted(PageRequest::first()).await?;
/// ```
#[derive(Clone)]
pub struct LogReader {
    view: LogView,
}

impl LogReader {
    /// Opens a reader for an existing log on read-only storage.
    ///
    /// Fails with [`Error::NotFound`] if the log does not exist.
    pub async fn open(
        storage: Arc<dyn StorageRead>,
        name: impl Into<LogName>,
        page_size: usize,
    ) -> Result<Self> {
        let view = LogView::new(name.into(), LogStorageRead::new(storage), page_size);
        view.state().await?;
        Ok(Self { view })
    }

    pub(crate) fn from_view(view: LogView) -> Self {
        Self { view }
    }
}

#[async_trait]
impl LogRead for LogReader {
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
