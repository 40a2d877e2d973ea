// src/target/mod.rs

//! Build targets.
//!
//! A target is anything the engine can check for existence and fingerprint:
//! a file, a directory, or any other addressable resource. Concrete kinds
//! live in submodules and are materialised from short reference strings via
//! the [`registry`].
//!
//! - [`file`] implements filesystem targets.
//! - [`registry`] maps reference schemes (`file:...`) to target factories.

pub mod file;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

pub use file::FileTarget;
pub use registry::TargetRegistry;

/// Shared handle to a target of any kind.
pub type TargetRef = Arc<dyn Target>;

/// Contract every artifact kind implements.
///
/// Two targets with the same [`name`](Target::name) are the same node in the
/// dependency graph and share the same digest-store entry, regardless of
/// their concrete type.
pub trait Target: Send + Sync + fmt::Debug {
    /// Globally unique, stable identity, e.g. `file:src/main.o`.
    fn name(&self) -> &str;

    /// Scheme-less reference used by rules and recipes, e.g. `src/main.o`.
    fn locator(&self) -> &str;

    /// Probe the artifact and compare it against `digest`, the last recorded
    /// fingerprint (`""` when the target has never been recorded).
    fn check(&self, digest: &str) -> Result<TargetStatus>;
}

/// Result of probing a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStatus {
    /// The artifact exists and either nothing was recorded for it yet or the
    /// recorded digest matches the current one.
    pub up_to_date: bool,
    pub exists: bool,
    /// Fresh fingerprint; empty when the artifact does not exist.
    pub current_digest: String,
}

impl TargetStatus {
    /// Derive the status from a probe result and the previously recorded digest.
    pub fn new(exists: bool, current_digest: String, recorded: &str) -> Self {
        let up_to_date = exists && (recorded.is_empty() || recorded == current_digest);
        Self {
            up_to_date,
            exists,
            current_digest,
        }
    }

    pub fn missing() -> Self {
        Self {
            up_to_date: false,
            exists: false,
            current_digest: String::new(),
        }
    }

    /// The artifact was recorded before and its fingerprint has moved since.
    pub fn changed_since(&self, recorded: &str) -> bool {
        !recorded.is_empty() && recorded != self.current_digest
    }
}
