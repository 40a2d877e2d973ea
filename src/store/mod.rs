// src/store/mod.rs

//! Transactional digest persistence.
//!
//! A [`DigestStore`] is a persisted `target name -> digest` mapping. Builds
//! never talk to it directly; they run inside a transaction:
//!
//! 1. [`read_write`] loads the full mapping once,
//! 2. hands a shared [`Transaction`] to the build, which reads digests and
//!    buffers writes (last write per key wins),
//! 3. and persists the mapping exactly once at the end, only when the build
//!    succeeded, was not cancelled, and at least one write was buffered.
//!
//! - [`file`] stores the mapping as a TOML table on disk.
//! - [`memory`] keeps it in memory (tests, throwaway builds).

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::cancel::CancelToken;
use crate::errors::{MakeError, Result};

pub use file::FileDigestStore;
pub use memory::MemoryDigestStore;

/// Mapping from target name to its last recorded digest.
pub type DigestMap = BTreeMap<String, String>;

/// Backing storage for a digest mapping.
pub trait DigestStore: Send + Sync {
    /// Read the whole mapping. A store that was never written is empty.
    fn load(&self) -> anyhow::Result<DigestMap>;

    /// Replace the whole persisted mapping with `digests`.
    fn persist(&self, digests: &DigestMap) -> anyhow::Result<()>;
}

/// A single buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestWrite {
    pub key: String,
    pub value: String,
}

impl DigestWrite {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// In-memory view of the store for the duration of one build.
///
/// Safe to share between workers; all access goes through one mutex.
#[derive(Debug)]
pub struct Transaction {
    state: Mutex<TransactionState>,
    read_only: bool,
}

#[derive(Debug)]
struct TransactionState {
    digests: DigestMap,
    dirty: bool,
}

impl Transaction {
    fn new(digests: DigestMap, read_only: bool) -> Self {
        Self {
            state: Mutex::new(TransactionState {
                digests,
                dirty: false,
            }),
            read_only,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last known digest for `key`, or `""` if none was recorded.
    pub fn read_value(&self, key: &str) -> String {
        self.lock().digests.get(key).cloned().unwrap_or_default()
    }

    pub fn read_values(&self, keys: &[&str]) -> Vec<String> {
        let state = self.lock();
        keys.iter()
            .map(|k| state.digests.get(*k).cloned().unwrap_or_default())
            .collect()
    }

    /// Buffer writes into the transaction. Empty batches leave it clean.
    pub fn buffer_writes(&self, writes: impl IntoIterator<Item = DigestWrite>) -> Result<()> {
        if self.read_only {
            return Err(MakeError::Other(anyhow::anyhow!(
                "cannot buffer digest writes in a read-only transaction"
            )));
        }
        let mut state = self.lock();
        for write in writes {
            debug!(key = %write.key, digest = %write.value, "buffered digest write");
            state.digests.insert(write.key, write.value);
            state.dirty = true;
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    fn into_dirty_map(self) -> Option<DigestMap> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.dirty.then_some(state.digests)
    }
}

/// Run `f` inside a read-write transaction over `store`.
///
/// A load failure aborts before `f` runs. Buffered writes are persisted
/// only if `f` succeeds and `cancel` was not triggered; a failed or
/// cancelled build discards every write, including those of targets that
/// completed before the failure.
pub async fn read_write<S, F, Fut>(store: &S, cancel: &CancelToken, f: F) -> Result<()>
where
    S: DigestStore + ?Sized,
    F: FnOnce(Arc<Transaction>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let digests = store.load().map_err(MakeError::StoreRead)?;
    let tx = Arc::new(Transaction::new(digests, false));

    f(Arc::clone(&tx)).await?;
    cancel.check()?;

    // Workers may still hold clones if `f` leaked them; fall back to a copy.
    let dirty = match Arc::try_unwrap(tx) {
        Ok(tx) => tx.into_dirty_map(),
        Err(shared) => {
            let state = shared.lock();
            state.dirty.then(|| state.digests.clone())
        }
    };

    match dirty {
        Some(digests) => {
            debug!(entries = digests.len(), "flushing digest store");
            store.persist(&digests).map_err(MakeError::StoreFlush)
        }
        None => {
            debug!("digest store clean; nothing to flush");
            Ok(())
        }
    }
}

/// Run `f` against a snapshot of `store`. Writes are rejected, nothing is persisted.
pub async fn read_only<S, F, Fut, T>(store: &S, f: F) -> Result<T>
where
    S: DigestStore + ?Sized,
    F: FnOnce(Arc<Transaction>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let digests = store.load().map_err(MakeError::StoreRead)?;
    f(Arc::new(Transaction::new(digests, true))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_are_persisted_once_and_read_back() -> Result<()> {
        let store = MemoryDigestStore::new();
        let cancel = CancelToken::new();

        read_write(&store, &cancel, |tx| async move {
            assert_eq!(tx.read_value("file:a"), "");
            tx.buffer_writes([DigestWrite::new("file:a", "f:1")])?;
            tx.buffer_writes([DigestWrite::new("file:a", "f:2")])?;
            Ok(())
        })
        .await?;
        assert_eq!(store.flush_count(), 1);

        let seen = read_only(&store, |tx| async move {
            Ok(tx.read_values(&["file:a", "file:b"]))
        })
        .await?;
        assert_eq!(seen, vec!["f:2".to_string(), String::new()]);
        Ok(())
    }

    #[tokio::test]
    async fn clean_transaction_is_not_flushed() -> Result<()> {
        let store = MemoryDigestStore::new();
        read_write(&store, &CancelToken::new(), |tx| async move {
            tx.buffer_writes(Vec::new())?;
            assert!(!tx.is_dirty());
            Ok(())
        })
        .await?;
        assert_eq!(store.flush_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_transaction_discards_writes() {
        let store = MemoryDigestStore::new();
        let result = read_write(&store, &CancelToken::new(), |tx| async move {
            tx.buffer_writes([DigestWrite::new("file:a", "f:1")])?;
            Err(MakeError::NoRule("file:b".into()))
        })
        .await;

        assert!(matches!(result, Err(MakeError::NoRule(_))));
        assert_eq!(store.flush_count(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn cancelled_transaction_discards_writes() {
        let store = MemoryDigestStore::new();
        let cancel = CancelToken::new();
        let result = read_write(&store, &cancel, |tx| {
            let cancel = cancel.clone();
            async move {
                tx.buffer_writes([DigestWrite::new("file:a", "f:1")])?;
                cancel.cancel();
                Ok(())
            }
        })
        .await;

        assert!(matches!(result, Err(MakeError::Cancelled)));
        assert_eq!(store.flush_count(), 0);
    }

    #[tokio::test]
    async fn read_only_transaction_rejects_writes() {
        let store = MemoryDigestStore::new();
        let result = read_only(&store, |tx| async move {
            tx.buffer_writes([DigestWrite::new("k", "v")])
        })
        .await;
        assert!(result.is_err());
        assert_eq!(store.flush_count(), 0);
    }
}
