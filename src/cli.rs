// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagmake`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagmake",
    version,
    about = "Rebuild only what changed, following rule-derived dependencies.",
    long_about = None
)]
pub struct CliArgs {
    /// Targets to build. Defaults to `[config].default` from the rule file.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Build directory: targets, recipes and the digest store are relative to it.
    #[arg(short = 'C', long = "directory", value_name = "DIR", default_value = ".")]
    pub directory: PathBuf,

    /// Rule file (TOML). Default: `dagmake.toml` in the build directory.
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Digest store path, overriding `[config].sumfile`. Relative paths are
    /// resolved against the build directory.
    #[arg(short = 's', long = "sumfile", value_name = "PATH")]
    pub sumfile: Option<PathBuf>,

    /// Maximum number of recipes running at once (0 = available parallelism).
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGMAKE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve and print the build order without running any recipe.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
