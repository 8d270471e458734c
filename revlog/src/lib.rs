//! revlog - A revisioned, append-only commit log built on SlateDB.
//!
//! A log is a named sequence of immutable commits, each tagged with a
//! revision number. A producer can fan writes out across many concurrent
//! tasks without serializing them through one transaction path, and a
//! consumer can still reconstruct a total order afterwards.
//!
//! # Architecture
//!
//! Revisions come from a transactional counter on each log. Allocation reads
//! the counter, increments it and writes the commit in one conditional batch.
//! When a concurrent writer wins that race, the commit is not retried
//! against the hot counter: it is deposited into a revision shard keyed by
//! the log and the revision it attempted. Readers merge both paths into one
//! view ordered by revision, then creation time, then commit id.
//!
//! # Key Concepts
//!
//! - **CommitLogDb**: owns the storage handle; creates and opens logs.
//! - **Log**: the aggregate root for one log, with commit creation,
//!   consumer mutations and the read views.
//! - **LogReader**: a read-only view of one log.
//! - **RevisionShard**: collects commits that collided on one revision.
//! - **Batch**: an explicit unit of concurrent work with a completion
//!   callback.
//!
//! # Example
//!
//! ```ignore
//! use revlog::{CommitLogDb, Config, LogRead, PageRequest};
//!
//! let db = CommitLogDb::open(Config::default()).await?;
//! let log = db.create_log("orders").await?;
//! log.new_commit("order-123").await?;
//!
//! let page = log.commits(PageRequest::first()).await?;
//! for commit in page.items {
//!     println!("rev={} data={:?}", commit.revision(), commit.data);
//! }
//! ```

mod allocator;
mod batch;
pub mod cli;
mod config;
mod error;
mod log;
mod model;
mod query;
mod range;
mod reader;
mod serde;
mod shard;
mod storage;
#[cfg(test)]
mod testing;
mod txn;

pub use allocator::{Allocation, RevisionAllocator};
pub use batch::{Batch, BatchContext, BatchReport};
pub use config::{Config, DEFAULT_PAGE_SIZE, FallbackConfig};
pub use error::{Error, Result};
pub use log::{CommitLogDb, Log};
pub use model::{
    Commit, CommitId, CommitKey, LogName, LogState, Placement, Revision, RevisionShard, ShardTag,
};
pub use query::{CommitQuery, Cursor, Page, PageRequest};
pub use reader::{LogRead, LogReader};
pub use shard::{ShardCommits, ShardFallback};
pub use txn::Transaction;
