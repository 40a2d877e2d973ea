// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// File name looked up in the build directory when `-f` is not given.
pub const DEFAULT_RULE_FILE: &str = "dagmake.toml";

/// Read and deserialize a rule file without semantic validation.
///
/// Use [`load_and_validate`] for the checked form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), rules = config.rules.len(), "loaded rule file");

    Ok(config)
}

/// Load a rule file and validate it:
///
/// - at least one rule, each with exactly one of `pattern` / `target`,
/// - patterns compile,
/// - templates only use placeholders the rule binds,
/// - `[config]` values are usable.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Rule file path for a build rooted at `dir`.
pub fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(DEFAULT_RULE_FILE)
}
