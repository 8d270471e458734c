//! Optimistic transactions over [`Storage`].
//!
//! A [`Transaction`] records the value it observed for every key it reads
//! and buffers every write. [`Transaction::commit`] hands both to
//! [`Storage::write_if`]: the observed values become preconditions, so the
//! buffered writes apply atomically only if no tracked key changed since it
//! was read. Dropping a transaction without committing discards it.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use common::{Precondition, Record, Storage, StorageRead, WriteOptions, WriteOutcome};

use crate::error::{Error, Result};

/// An optimistic read-modify-write transaction.
pub struct Transaction {
    storage: Arc<dyn Storage>,
    scope: String,
    reads: BTreeMap<Bytes, Option<Bytes>>,
    writes: BTreeMap<Bytes, Bytes>,
}

impl Transaction {
    /// Starts a transaction. `scope` names the entity group the transaction
    /// works on and appears in contention errors.
    pub fn begin(storage: Arc<dyn Storage>, scope: impl Into<String>) -> Self {
        Self {
            storage,
            scope: scope.into(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Reads `key` and tracks the observed value.
    ///
    /// Sees this transaction's own buffered writes. Repeated reads of one key
    /// return the first observed value.
    pub async fn get(&mut self, key: Bytes) -> Result<Option<Bytes>> {
        if let Some(value) = self.writes.get(&key) {
            return Ok(Some(value.clone()));
        }
        if let Some(observed) = self.reads.get(&key) {
            return Ok(observed.clone());
        }
        let observed = self.storage.get(key.clone()).await?.map(|r| r.value);
        self.reads.insert(key, observed.clone());
        Ok(observed)
    }

    /// Buffers a write. Nothing is visible until commit.
    pub fn put(&mut self, key: Bytes, value: Bytes) {
        self.writes.insert(key, value);
    }

    /// Applies every buffered write atomically if no tracked read changed.
    ///
    /// Returns [`Error::Contention`] if a concurrent writer got there first;
    /// in that case nothing is written.
    pub async fn commit(self, options: WriteOptions) -> Result<()> {
        let preconditions = self
            .reads
            .into_iter()
            .map(|(key, expected)| Precondition::new(key, expected))
            .collect();
        let records = self
            .writes
            .into_iter()
            .map(|(key, value)| Record::new(key, value))
            .collect();

        match self
            .storage
            .write_if(preconditions, records, options)
            .await?
        {
            WriteOutcome::Applied => Ok(()),
            WriteOutcome::Conflict { key } => {
                tracing::debug!(scope = %self.scope, key = ?key, "transaction conflicted");
                Err(Error::Contention(format!(
                    "{} was modified by a concurrent writer",
                    self.scope
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::in_memory::InMemoryStorage;

    fn storage() -> Arc<dyn Storage> {
        Arc::new(InMemoryStorage::new())
    }

    async fn seed(storage: &Arc<dyn Storage>, key: &'static str, value: &'static str) {
        storage
            .put(vec![Record::new(Bytes::from(key), Bytes::from(value))])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_apply_writes_on_commit() {
        // given
        let storage = storage();
        seed(&storage, "counter", "1").await;
        let mut txn = Transaction::begin(Arc::clone(&storage), "counter");

        // when
        let current = txn.get(Bytes::from("counter")).await.unwrap();
        txn.put(Bytes::from("counter"), Bytes::from("2"));
        txn.put(Bytes::from("entry"), Bytes::from("x"));
        txn.commit(WriteOptions::default()).await.unwrap();

        // then
        assert_eq!(current, Some(Bytes::from("1")));
        let counter = storage.get(Bytes::from("counter")).await.unwrap().unwrap();
        assert_eq!(counter.value, Bytes::from("2"));
        assert!(storage.get(Bytes::from("entry")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_read_own_writes() {
        // given
        let mut txn = Transaction::begin(storage(), "scope");

        // when
        txn.put(Bytes::from("k"), Bytes::from("v"));

        // then
        assert_eq!(
            txn.get(Bytes::from("k")).await.unwrap(),
            Some(Bytes::from("v"))
        );
    }

    #[tokio::test]
    async fn should_fail_with_contention_when_read_changed() {
        // given
        let storage = storage();
        seed(&storage, "counter", "1").await;
        let mut txn = Transaction::begin(Arc::clone(&storage), "counter");
        txn.get(Bytes::from("counter")).await.unwrap();
        txn.put(Bytes::from("counter"), Bytes::from("2"));
        txn.put(Bytes::from("entry"), Bytes::from("x"));

        // when - a concurrent writer bumps the counter first
        seed(&storage, "counter", "5").await;
        let result = txn.commit(WriteOptions::default()).await;

        // then - nothing from the transaction is visible
        assert!(matches!(result, Err(Error::Contention(_))));
        let counter = storage.get(Bytes::from("counter")).await.unwrap().unwrap();
        assert_eq!(counter.value, Bytes::from("5"));
        assert!(storage.get(Bytes::from("entry")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_detect_concurrent_creation_of_absent_key() {
        // given
        let storage = storage();
        let mut txn = Transaction::begin(Arc::clone(&storage), "log");
        assert!(txn.get(Bytes::from("log")).await.unwrap().is_none());
        txn.put(Bytes::from("log"), Bytes::from("mine"));

        // when
        seed(&storage, "log", "theirs").await;
        let result = txn.commit(WriteOptions::default()).await;

        // then
        assert!(matches!(result, Err(Error::Contention(_))));
    }

    #[tokio::test]
    async fn should_discard_writes_when_dropped() {
        // given
        let storage = storage();
        let mut txn = Transaction::begin(Arc::clone(&storage), "scope");
        txn.put(Bytes::from("k"), Bytes::from("v"));

        // when
        drop(txn);

        // then
        assert!(storage.get(Bytes::from("k")).await.unwrap().is_none());
    }
}
