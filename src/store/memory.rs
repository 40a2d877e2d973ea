// src/store/memory.rs

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tracing::debug;

use super::{DigestMap, DigestStore};

/// Digest store kept in memory only (lost when dropped).
#[derive(Debug, Default)]
pub struct MemoryDigestStore {
    digests: Mutex<DigestMap>,
    flushes: AtomicUsize,
}

impl MemoryDigestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. to simulate a previous build.
    pub fn with_digests(digests: DigestMap) -> Self {
        Self {
            digests: Mutex::new(digests),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Copy of the currently persisted mapping.
    pub fn snapshot(&self) -> DigestMap {
        self.digests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// How many times a transaction has persisted into this store.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl DigestStore for MemoryDigestStore {
    fn load(&self) -> Result<DigestMap> {
        Ok(self.snapshot())
    }

    fn persist(&self, digests: &DigestMap) -> Result<()> {
        *self
            .digests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = digests.clone();
        self.flushes.fetch_add(1, Ordering::SeqCst);
        debug!(entries = digests.len(), "stored target digests (memory)");
        Ok(())
    }
}
