//! Transactional revision allocation.
//!
//! [`RevisionAllocator`] is the single point of strict ordering: it reads a
//! log's `latest_revision`, increments it by one and writes it back inside a
//! [`Transaction`] scoped to the log. Two allocators racing on one log can
//! never both succeed with the same revision; the loser sees contention.

use std::sync::Arc;

use bytes::Bytes;
use common::{Clock, Storage, WriteOptions};

use crate::error::{Error, Result};
use crate::model::{Commit, CommitId, CommitKey, LogName, Placement, Revision};
use crate::serde::{deserialize_log_state, log_key, serialize_commit, serialize_log_state};
use crate::txn::Transaction;

/// Result of an allocation attempt that may lose a race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation<T> {
    /// The transaction committed.
    Granted(T),
    /// A concurrent writer changed the log first. `attempted` is the
    /// revision this attempt would have assigned.
    Contended { attempted: Revision },
}

/// Hands out strictly increasing revisions per log.
#[derive(Clone)]
pub struct RevisionAllocator {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl RevisionAllocator {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Increments the log's revision counter and returns the new value.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the log does not exist.
    /// - [`Error::Contention`] if a concurrent writer changed the log.
    pub async fn allocate(&self, log: &LogName) -> Result<Revision> {
        match self.run(log, None).await? {
            Allocation::Granted((revision, _)) => Ok(revision),
            Allocation::Contended { attempted } => Err(Error::Contention(format!(
                "revision {} of log {} was taken by a concurrent writer",
                attempted, log
            ))),
        }
    }

    /// Allocates a revision and writes a direct commit in the same atomic
    /// batch. Contention is reported as a value so the caller can fall back.
    pub(crate) async fn allocate_commit(
        &self,
        log: &LogName,
        data: Bytes,
    ) -> Result<Allocation<Commit>> {
        Ok(match self.run(log, Some(data)).await? {
            Allocation::Granted((_, Some(commit))) => Allocation::Granted(commit),
            Allocation::Granted((revision, None)) => {
                return Err(Error::Internal(format!(
                    "allocation of revision {} for log {} produced no commit",
                    revision, log
                )));
            }
            Allocation::Contended { attempted } => Allocation::Contended { attempted },
        })
    }

    async fn run(
        &self,
        log: &LogName,
        data: Option<Bytes>,
    ) -> Result<Allocation<(Revision, Option<Commit>)>> {
        let mut txn = Transaction::begin(Arc::clone(&self.storage), format!("log {}", log));
        let key = log_key(log);
        let value = txn
            .get(key.clone())
            .await?
            .ok_or_else(|| Error::NotFound(format!("log {}", log)))?;
        let mut state = deserialize_log_state(log.clone(), &value)?;

        let revision = state.latest_revision.checked_add(1).ok_or_else(|| {
            Error::Internal(format!("revision counter of log {} overflowed", log))
        })?;
        let now_ms = self.clock.now_ms();
        state.latest_revision = revision;
        state.updated_ms = now_ms;
        txn.put(key, serialize_log_state(&state));

        let commit = data.map(|data| Commit {
            key: CommitKey::new(log.clone(), revision, now_ms, CommitId::generate()),
            placement: Placement::Direct { revision },
            data,
            applied: false,
            updated_ms: now_ms,
        });
        if let Some(commit) = &commit {
            let record = serialize_commit(commit);
            txn.put(record.key, record.value);
        }

        match txn.commit(WriteOptions::default()).await {
            Ok(()) => Ok(Allocation::Granted((revision, commit))),
            Err(Error::Contention(_)) => {
                tracing::debug!(log = %log, attempted = revision, "revision allocation contended");
                Ok(Allocation::Contended {
                    attempted: revision,
                })
            }
            Err(e) => Err(e),
        }
    }
}
