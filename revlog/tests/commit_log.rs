//! End-to-end tests for the commit log through its public API.

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use common::StorageConfig;
use common::storage::config::SlateDbStorageConfig;
use revlog::{
    Batch, Commit, CommitLogDb, CommitQuery, Config, Error, FallbackConfig, Log, LogRead,
    PageRequest, Placement, Revision, RevisionShard,
};

fn in_memory_config() -> Config {
    Config {
        storage: StorageConfig::InMemory,
        ..Default::default()
    }
}

fn slatedb_config() -> Config {
    Config {
        storage: StorageConfig::SlateDb(SlateDbStorageConfig::default()),
        ..Default::default()
    }
}

fn contended_config(base: Config) -> Config {
    Config {
        fallback: FallbackConfig {
            deposit_attempts: 64,
        },
        ..base
    }
}

async fn history(log: &Log) -> Vec<Commit> {
    let mut items = Vec::new();
    let mut request = Some(PageRequest::with_limit(3));
    while let Some(page) = request {
        let page = log.history(page).await.unwrap();
        request = page.next_request(Some(3));
        items.extend(page.items);
    }
    items
}

async fn shards(log: &Log) -> Vec<RevisionShard> {
    let mut items = Vec::new();
    let mut request = Some(PageRequest::with_limit(3));
    while let Some(page) = request {
        let page = log.revision_shards(page).await.unwrap();
        request = page.next_request(Some(3));
        items.extend(page.items);
    }
    items
}

#[tokio::test]
async fn should_record_three_sequential_commits() {
    // given
    let db = CommitLogDb::open(in_memory_config()).await.unwrap();
    let log = db.create_log("simple").await.unwrap();

    // when
    for payload in ["a", "b", "c"] {
        log.new_commit(payload).await.unwrap();
    }

    // then
    assert_eq!(log.state().await.unwrap().latest_revision, 3);
    let commits = log.commits(PageRequest::first()).await.unwrap();
    let data: Vec<_> = commits.items.iter().map(|c| c.data.clone()).collect();
    assert_eq!(data, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
}

#[tokio::test]
async fn should_return_data_unmodified() {
    // given
    let db = CommitLogDb::open(in_memory_config()).await.unwrap();
    let log = db.create_log("binary").await.unwrap();
    let payload = Bytes::from_static(&[0x00, 0x01, 0xFF, 0x10, 0x00]);

    // when
    let commit = log.new_commit(payload.clone()).await.unwrap();

    // then
    assert_eq!(log.commit(&commit.key).await.unwrap().data, payload);
    let page = log.commits(PageRequest::first()).await.unwrap();
    assert_eq!(page.items[0].data, payload);
}

#[tokio::test]
async fn should_filter_commit_range_by_applied_flag() {
    // given
    let db = CommitLogDb::open(in_memory_config()).await.unwrap();
    let log = db.create_log("range").await.unwrap();
    let mut commits = Vec::new();
    for i in 0..5 {
        commits.push(log.new_commit(format!("c{}", i)).await.unwrap());
    }
    log.mark_applied(&commits[1].key).await.unwrap();

    // when
    let unapplied = log
        .commit_range(1, 3, false, PageRequest::first())
        .await
        .unwrap();
    let applied = log
        .commit_range(1, 3, true, PageRequest::first())
        .await
        .unwrap();

    // then
    let revisions: Vec<_> = unapplied.items.iter().map(Commit::revision).collect();
    assert_eq!(revisions, vec![1, 3]);
    assert!(unapplied.items.iter().all(|c| !c.applied));
    assert_eq!(applied.items.len(), 1);
    assert_eq!(applied.items[0].revision(), 2);
    assert!(matches!(
        log.commit_range(3, 1, false, PageRequest::first()).await,
        Err(Error::InvalidInput(_))
    ));
}

/// Races `writers` commits against one log and checks that every write
/// landed exactly once, either directly or in the shard for its revision.
async fn assert_concurrent_writers_land_once(db: &CommitLogDb, writers: usize) {
    let log = db.create_log("concurrent").await.unwrap();

    let mut batch = Batch::new();
    for _ in 0..writers {
        let log = log.clone();
        batch.add(move |ctx| async move {
            log.new_commit(format!("w{}", ctx.index)).await.map(|_| ())
        });
    }
    let report = batch.finish().await;

    assert!(report.is_success(), "failures: {:?}", report.failed);
    let all = history(&log).await;
    assert_eq!(all.len(), writers);

    let mut direct_per_revision: HashMap<Revision, usize> = HashMap::new();
    for commit in all.iter().filter(|c| c.placement.is_direct()) {
        *direct_per_revision.entry(commit.revision()).or_default() += 1;
    }
    assert!(direct_per_revision.values().all(|&n| n == 1));

    // the counter equals the number of direct allocations
    let state = log.state().await.unwrap();
    assert_eq!(state.latest_revision as usize, direct_per_revision.len());
    let expected: Vec<Revision> = (1..=state.latest_revision).collect();
    let mut direct: Vec<_> = direct_per_revision.keys().copied().collect();
    direct.sort();
    assert_eq!(direct, expected);

    // every sharded commit is a member of the shard for its revision
    let shards = shards(&log).await;
    let sharded: Vec<_> = all.iter().filter(|c| !c.placement.is_direct()).collect();
    let members: usize = shards.iter().map(|s| s.count as usize).sum();
    assert_eq!(members, sharded.len());
    for commit in sharded {
        let Placement::Sharded { tag, .. } = &commit.placement else {
            unreachable!();
        };
        assert!(tag.revision <= state.latest_revision);
        let shard = log.shard(tag.revision).await.unwrap();
        assert!(shard.commit_keys.contains(&commit.key));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_never_store_two_direct_commits_with_one_revision() {
    let db = CommitLogDb::open(contended_config(in_memory_config()))
        .await
        .unwrap();
    assert_concurrent_writers_land_once(&db, 32).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_fall_back_to_shards_on_slatedb_backend() {
    let db = CommitLogDb::open(contended_config(slatedb_config()))
        .await
        .unwrap();
    assert_concurrent_writers_land_once(&db, 16).await;
    db.close().await.unwrap();
}

#[tokio::test]
async fn should_order_history_by_revision_then_created() {
    // given
    let db = CommitLogDb::open(in_memory_config()).await.unwrap();
    let log = db.create_log("ordered").await.unwrap();
    for i in 0..7 {
        log.new_commit(format!("{}", i)).await.unwrap();
    }

    // when
    let all = history(&log).await;

    // then
    let keys: Vec<_> = all.iter().map(|c| c.key.clone()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[tokio::test]
async fn should_query_through_reader() {
    // given
    let db = CommitLogDb::open(in_memory_config()).await.unwrap();
    let log = db.create_log("consumer").await.unwrap();
    for i in 0..4 {
        log.new_commit(format!("{}", i)).await.unwrap();
    }
    log.advance_applied_revision(2).await.unwrap();

    // when
    let reader = db.reader("consumer").await.unwrap();
    let pending = reader.uncommitted(PageRequest::first()).await.unwrap();
    let window = reader
        .query(CommitQuery::new().revisions(2..).page(PageRequest::with_limit(2)))
        .await
        .unwrap();

    // then
    let revisions: Vec<_> = pending.items.iter().map(Commit::revision).collect();
    assert_eq!(revisions, vec![2, 3, 4]);
    let revisions: Vec<_> = window.items.iter().map(Commit::revision).collect();
    assert_eq!(revisions, vec![2, 3]);
    assert!(window.next.is_some());
}

#[tokio::test]
async fn should_persist_on_slatedb_backend() {
    // given
    let db = CommitLogDb::open(slatedb_config()).await.unwrap();
    let log = db.create_log("slate").await.unwrap();

    // when
    log.new_commit("a").await.unwrap();
    log.new_commit("b").await.unwrap();
    db.flush().await.unwrap();

    // then
    let commits = log.commits(PageRequest::first()).await.unwrap();
    assert_eq!(commits.items.len(), 2);
    assert_eq!(log.revisions(PageRequest::first()).await.unwrap().items, vec![1, 2]);
    db.close().await.unwrap();
}

#[tokio::test]
async fn should_page_commits_across_cursor_on_slatedb_backend() {
    // given
    let db = CommitLogDb::open(slatedb_config()).await.unwrap();
    let log = db.create_log("paged").await.unwrap();
    for i in 0..5 {
        log.new_commit(format!("{}", i)).await.unwrap();
    }

    // when
    let first = log.commits(PageRequest::with_limit(2)).await.unwrap();
    let second = log
        .commits(first.next_request(Some(2)).unwrap())
        .await
        .unwrap();
    let third = log
        .commits(second.next_request(Some(2)).unwrap())
        .await
        .unwrap();

    // then
    let revisions: Vec<_> = [&first, &second, &third]
        .iter()
        .flat_map(|page| page.items.iter().map(Commit::revision))
        .collect();
    assert_eq!(revisions, vec![1, 2, 3, 4, 5]);
    assert!(!second.is_last());
    assert!(third.is_last());
    db.close().await.unwrap();
}

#[tokio::test]
async fn should_return_empty_page_for_empty_revision_query_on_slatedb_backend() {
    // given
    let db = CommitLogDb::open(slatedb_config()).await.unwrap();
    let log = db.create_log("empty").await.unwrap();
    log.new_commit("a").await.unwrap();

    // when
    let empty = log.query(CommitQuery::new().revisions(3..3)).await.unwrap();
    let excluded = log
        .query(CommitQuery::new().revisions((Bound::Excluded(1), Bound::Included(1))))
        .await
        .unwrap();

    // then
    assert!(empty.items.is_empty());
    assert!(empty.is_last());
    assert!(excluded.items.is_empty());
    db.close().await.unwrap();
}

#[tokio::test]
async fn should_return_empty_page_when_cursor_is_past_range_on_slatedb_backend() {
    // given
    let db = CommitLogDb::open(slatedb_config()).await.unwrap();
    let log = db.create_log("resume").await.unwrap();
    for i in 0..4 {
        log.new_commit(format!("{}", i)).await.unwrap();
    }
    // cursor positioned at revision 3
    let page = log.history(PageRequest::with_limit(2)).await.unwrap();
    let cursor = page.next.clone().unwrap();

    // when
    let resumed = log
        .query(
            CommitQuery::new()
                .revisions(1..=2)
                .page(PageRequest::first().after(cursor)),
        )
        .await
        .unwrap();

    // then
    assert!(resumed.items.is_empty());
    assert!(resumed.is_last());
    db.close().await.unwrap();
}

#[tokio::test]
async fn should_resolve_parent_log_from_commit() {
    let db = Arc::new(CommitLogDb::open(in_memory_config()).await.unwrap());
    let log = db.create_log("parent").await.unwrap();
    let commit = log.new_commit("a").await.unwrap();
    let parent = db.parent_of(&commit).await.unwrap();
    assert_eq!(parent.name(), log.name());
}
