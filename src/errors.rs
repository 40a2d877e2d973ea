// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Extension points (targets, rules, invocations, executors, digest stores)
//! report failures as [`anyhow::Error`]; the build engine wraps them in the
//! variant matching where the failure happened, tagged with the identity of
//! the target in scope.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MakeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A rule failed while matching a target or computing its prerequisites.
    #[error("error resolving rule for target '{target}': {source:#}")]
    Resolution {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// A leaf target (no matching rule) does not exist.
    #[error("no rule to make target '{0}'")]
    NoRule(String),

    #[error("error checking status of target '{target}': {source:#}")]
    Check {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error checking status of target '{target}' post-exec: {source:#}")]
    PostCheck {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error making target '{target}': {source:#}")]
    Execution {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error reading digest store: {0:#}")]
    StoreRead(#[source] anyhow::Error),

    #[error("error flushing digest store: {0:#}")]
    StoreFlush(#[source] anyhow::Error),

    #[error("dependency cycle detected involving target '{0}'")]
    Cycle(String),

    #[error("build cancelled")]
    Cancelled,

    #[error("unknown target scheme '{0}'")]
    UnknownScheme(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MakeError {
    /// Identity of the target this error concerns, when there is one.
    pub fn target(&self) -> Option<&str> {
        match self {
            MakeError::Resolution { target, .. }
            | MakeError::Check { target, .. }
            | MakeError::PostCheck { target, .. }
            | MakeError::Execution { target, .. } => Some(target),
            MakeError::NoRule(target) | MakeError::Cycle(target) => Some(target),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MakeError>;
