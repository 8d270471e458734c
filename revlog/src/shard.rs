//! Contention fallback through revision shards.
//!
//! When the revision allocator loses a race, the commit is not retried
//! against the hot log counter. It is deposited instead into the
//! [`RevisionShard`] for the revision the allocator attempted. Deposits
//! validate only the shard record, so they never contend with the counter.

use std::sync::Arc;

use bytes::Bytes;
use common::{Clock, Storage, WriteOptions};

use crate::config::FallbackConfig;
use crate::error::{Error, Result};
use crate::model::{Commit, CommitId, CommitKey, LogName, Placement, Revision, RevisionShard, ShardTag};
use crate::reader::LogRead;
use crate::serde::{deserialize_shard, serialize_commit, serialize_shard};
use crate::storage::{LogStorage, LogStorageRead};
use crate::txn::Transaction;

/// Alternate write path used after allocation contention.
#[derive(Clone)]
pub struct ShardFallback {
    storage: LogStorage,
    clock: Arc<dyn Clock>,
    deposit_attempts: u32,
}

impl ShardFallback {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: &FallbackConfig) -> Self {
        Self {
            storage: LogStorage::new(storage),
            clock,
            deposit_attempts: config.deposit_attempts.max(1),
        }
    }

    /// Records `data` as a commit in the shard for `attempted`.
    ///
    /// The shard is created on first use. The commit keeps the attempted
    /// revision and is appended to the shard's member list.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the log does not exist.
    /// - [`Error::Contention`] if every attempt lost a race with another
    ///   deposit into the same shard.
    pub async fn deposit(&self, log: &LogName, attempted: Revision, data: Bytes) -> Result<Commit> {
        self.storage.as_read().require_log(log).await?;
        let tag = ShardTag::new(log.clone(), attempted);

        let mut attempt = 1;
        loop {
            match self.try_deposit(&tag, data.clone()).await {
                Err(err) if err.is_contention() && attempt < self.deposit_attempts => {
                    tracing::warn!(shard = %tag, attempt, "shard deposit conflicted: {}", err);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_deposit(&self, tag: &ShardTag, data: Bytes) -> Result<Commit> {
        let mut txn = Transaction::begin(self.storage.storage(), format!("shard {}", tag));
        let now_ms = self.clock.now_ms();
        let shard_key = tag.serialize();

        let mut shard = match txn.get(shard_key.clone()).await? {
            Some(value) => deserialize_shard(tag.clone(), &value)?,
            None => RevisionShard::new(tag.clone(), now_ms),
        };

        let commit = Commit {
            key: CommitKey::new(tag.log.clone(), tag.revision, now_ms, CommitId::generate()),
            placement: Placement::Sharded {
                tag: tag.clone(),
                revision: tag.revision,
            },
            data,
            applied: false,
            updated_ms: now_ms,
        };
        shard.push(commit.key.clone(), now_ms);

        txn.put(shard_key, serialize_shard(&shard));
        let record = serialize_commit(&commit);
        txn.put(record.key, record.value);
        txn.commit(WriteOptions::default()).await?;

        tracing::debug!(shard = %tag, count = shard.count, "deposited commit into shard");
        Ok(commit)
    }
}

impl RevisionShard {
    /// Lazily resolves this shard's members through `reader`.
    pub fn commits<R: LogRead + ?Sized>(&self, reader: &R) -> ShardCommits {
        reader.shard_commits(self)
    }
}

/// Lazy iterator over the commits referenced by a shard.
///
/// Yields members in insertion order. Finite, and restartable with
/// [`ShardCommits::reset`].
pub struct ShardCommits {
    storage: LogStorageRead,
    keys: Vec<CommitKey>,
    position: usize,
}

impl ShardCommits {
    pub(crate) fn new(storage: LogStorageRead, keys: Vec<CommitKey>) -> Self {
        Self {
            storage,
            keys,
            position: 0,
        }
    }

    /// Returns the next member commit, or `None` when exhausted.
    ///
    /// A reference to a commit that does not exist yields
    /// [`Error::NotFound`].
    pub async fn next(&mut self) -> Result<Option<Commit>> {
        let Some(key) = self.keys.get(self.position) else {
            return Ok(None);
        };
        let commit = self.storage.get_commit(key).await?.ok_or_else(|| {
            Error::NotFound(format!(
                "commit {} at revision {} of log {}",
                key.id, key.revision, key.log
            ))
        })?;
        self.position += 1;
        Ok(Some(commit))
    }

    /// Rewinds to the first member.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drains the remaining members into a vector.
    pub async fn collect_remaining(&mut self) -> Result<Vec<Commit>> {
        let mut commits = Vec::with_capacity(self.keys.len() - self.position);
        while let Some(commit) = self.next().await? {
            commits.push(commit);
        }
        Ok(commits)
    }
}
