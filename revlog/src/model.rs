//! Core data types for revlog.
//!
//! This module defines the entities persisted by the commit log: the
//! [`LogState`] aggregate, the immutable [`Commit`] records and the
//! [`RevisionShard`] aggregates that collect commits written through the
//! contention fallback.

use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

/// Revision number assigned to a commit.
///
/// Revisions are handed out by the revision allocator, start at 1 and are
/// strictly increasing per log on the direct path. Commits written through
/// the shard fallback reuse the revision the allocator attempted.
pub type Revision = u64;

/// Name identifying a log.
///
/// Names are opaque strings, immutable once the log is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogName(String);

impl LogName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a random name for callers that have none.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for LogName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Auto-assigned commit identifier, independent of the revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(Uuid);

impl CommitId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable reference to a commit.
///
/// Field order matches storage order: commits of one log sort by revision,
/// then creation time, then id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitKey {
    pub log: LogName,
    pub revision: Revision,
    pub created_ms: i64,
    pub id: CommitId,
}

impl CommitKey {
    pub fn new(log: LogName, revision: Revision, created_ms: i64, id: CommitId) -> Self {
        Self {
            log,
            revision,
            created_ms,
            id,
        }
    }
}

/// Tag identifying the shard for one (log, revision) pair.
///
/// Renders as `<log-name>-<revision>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardTag {
    pub log: LogName,
    pub revision: Revision,
}

impl ShardTag {
    pub fn new(log: LogName, revision: Revision) -> Self {
        Self { log, revision }
    }
}

impl fmt::Display for ShardTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.log, self.revision)
    }
}

/// Which write path produced a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Written by the revision allocator with a freshly assigned revision.
    Direct { revision: Revision },
    /// Written into a shard after the allocator lost a race for `revision`.
    Sharded { tag: ShardTag, revision: Revision },
}

impl Placement {
    pub fn revision(&self) -> Revision {
        match self {
            Placement::Direct { revision } | Placement::Sharded { revision, .. } => *revision,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Placement::Direct { .. })
    }
}

/// An immutable unit of data recorded in a log.
///
/// Only `applied` and `updated_ms` change after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub key: CommitKey,
    pub placement: Placement,
    /// Opaque payload, never interpreted by the log.
    pub data: Bytes,
    pub applied: bool,
    pub updated_ms: i64,
}

impl Commit {
    pub fn revision(&self) -> Revision {
        self.key.revision
    }

    /// Name of the owning log.
    pub fn parent(&self) -> &LogName {
        &self.key.log
    }

    pub fn created_ms(&self) -> i64 {
        self.key.created_ms
    }

    pub fn id(&self) -> CommitId {
        self.key.id
    }
}

/// Persisted state of a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogState {
    pub name: LogName,
    pub created_ms: i64,
    pub updated_ms: i64,
    /// Highest revision handed out by the allocator. Never decreases.
    pub latest_revision: Revision,
    /// Progress recorded by the downstream consumer.
    pub applied_revision: Option<Revision>,
}

impl LogState {
    pub fn new(name: LogName, now_ms: i64) -> Self {
        Self {
            name,
            created_ms: now_ms,
            updated_ms: now_ms,
            latest_revision: 0,
            applied_revision: None,
        }
    }
}

/// Aggregate of commits that collided on one revision.
///
/// Shards only grow: `count` always equals `commit_keys.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionShard {
    pub tag: ShardTag,
    pub count: u64,
    /// Member commits in insertion order.
    pub commit_keys: Vec<CommitKey>,
    pub created_ms: i64,
    pub updated_ms: i64,
}

impl RevisionShard {
    pub fn new(tag: ShardTag, now_ms: i64) -> Self {
        Self {
            tag,
            count: 0,
            commit_keys: Vec::new(),
            created_ms: now_ms,
            updated_ms: now_ms,
        }
    }

    pub fn revision(&self) -> Revision {
        self.tag.revision
    }

    pub fn log(&self) -> &LogName {
        &self.tag.log
    }

    pub(crate) fn push(&mut self, key: CommitKey, now_ms: i64) {
        self.commit_keys.push(key);
        self.count += 1;
        self.updated_ms = now_ms;
    }
}
