// src/exec/mod.rs

//! Command execution back end.
//!
//! Invocations hand their command lines to an [`Executor`]; the build engine
//! never spawns anything itself. Tests can substitute a recording executor
//! that never touches the OS.
//!
//! - [`shell`] provides [`ShellExecutor`], which runs each command through a
//!   shell using `tokio::process::Command`.

pub mod shell;

use crate::cancel::CancelToken;
use crate::rule::BoxFuture;

pub use shell::ShellExecutor;

/// Capability to run one command line of a recipe.
pub trait Executor: Send + Sync {
    /// Run `command` to completion. A non-successful outcome is an error.
    ///
    /// Implementations may refuse to start when `cancel` has already fired;
    /// they are not required to abort a command that is already running.
    fn run_command<'a>(
        &'a self,
        command: &'a str,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}
