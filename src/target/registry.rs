// src/target/registry.rs

//! Scheme-keyed target factories.
//!
//! Front ends turn short reference strings such as `out/app` or
//! `file:out/app` into [`TargetRef`]s without knowing the concrete target
//! types. The process-wide registry is populated once at startup (either
//! implicitly with the built-in schemes, or explicitly via
//! [`TargetRegistry::install`]) and is read-only afterwards.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::errors::{MakeError, Result};
use crate::target::{FileTarget, TargetRef};

/// Builds a target from its base directory and scheme-less locator.
pub type TargetFactory = fn(base: &Path, locator: &str) -> TargetRef;

/// Scheme used for references without an explicit `scheme:` prefix.
pub const DEFAULT_SCHEME: &str = "file";

static GLOBAL: OnceLock<TargetRegistry> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    factories: BTreeMap<String, TargetFactory>,
}

impl TargetRegistry {
    /// An empty registry (no schemes at all).
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding the built-in schemes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_SCHEME, file_factory);
        registry
    }

    /// Register `factory` for `scheme`.
    ///
    /// # Panics
    ///
    /// Registering the same scheme twice is a programming error.
    pub fn register(&mut self, scheme: &str, factory: TargetFactory) {
        if self.factories.contains_key(scheme) {
            panic!("duplicate registration for scheme {scheme}");
        }
        self.factories.insert(scheme.to_string(), factory);
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|s| s.as_str())
    }

    /// Materialise a target from `reference`, resolving paths against `base`.
    ///
    /// `scheme:rest` selects a factory by scheme; a bare reference (or one
    /// whose prefix is not a plausible scheme, e.g. a Windows drive letter)
    /// uses [`DEFAULT_SCHEME`].
    pub fn materialize(&self, reference: &str, base: &Path) -> Result<TargetRef> {
        let (scheme, locator) = split_reference(reference);
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| MakeError::UnknownScheme(scheme.to_string()))?;
        Ok(factory(base, locator))
    }

    /// Install `registry` as the process-wide registry.
    ///
    /// Must happen before the first call to [`TargetRegistry::global`];
    /// afterwards the global registry is frozen.
    pub fn install(registry: TargetRegistry) -> std::result::Result<(), TargetRegistry> {
        GLOBAL.set(registry)
    }

    /// The process-wide registry, defaulting to [`TargetRegistry::with_builtins`].
    pub fn global() -> &'static TargetRegistry {
        GLOBAL.get_or_init(TargetRegistry::with_builtins)
    }
}

fn file_factory(base: &Path, locator: &str) -> TargetRef {
    Arc::new(FileTarget::new(base, locator))
}

fn split_reference(reference: &str) -> (&str, &str) {
    match reference.split_once(':') {
        Some((scheme, rest)) if is_scheme(scheme) => {
            // `file:///abs` and `file://host/...` style references keep a
            // single leading slash.
            let rest = match rest.strip_prefix("//") {
                Some(stripped) if stripped.starts_with('/') => stripped,
                _ => rest,
            };
            (scheme, rest)
        }
        _ => (DEFAULT_SCHEME, reference),
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    // Single letters are drive letters, not schemes.
    s.len() > 1 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
