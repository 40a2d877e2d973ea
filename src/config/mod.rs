// src/config/mod.rs

//! Rule file loading and validation.
//!
//! - [`model`] defines the TOML data model.
//! - [`loader`] reads a rule file from disk.
//! - [`validate`] turns a raw file into a checked [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_RULE_FILE, default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, RuleConfig};
