// src/lib.rs

//! Digest-based incremental build orchestrator.
//!
//! Requested targets are expanded through an ordered rule list into a
//! dependency graph, which is then walked bottom-up with bounded
//! parallelism. Each target is compared against the digest recorded by the
//! previous build, and only missing or invalidated targets have their
//! recipes run. Digests are committed once, atomically, per build.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod frontend;
pub mod logging;
pub mod make;
pub mod rule;
pub mod store;
pub mod target;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::exec::ShellExecutor;
use crate::make::Make;
use crate::store::FileDigestStore;
use crate::target::{TargetRef, TargetRegistry};

pub use crate::errors::MakeError;
pub use crate::make::MakeSummary;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - rule file loading and rule construction
/// - target materialisation
/// - the file-backed digest store
/// - the shell executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let dir = args.directory.clone();
    let config_path = args
        .file
        .clone()
        .unwrap_or_else(|| default_config_path(&dir));
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading rule file {}", config_path.display()))?;

    let registry = TargetRegistry::global();
    let rules = frontend::build_rules(&cfg, &dir, registry)?;
    let targets = requested_targets(&args, &cfg, registry)?;

    // Relative store paths, from the flag or the rule file, live under `-C`.
    let sumfile = dir.join(
        args.sumfile
            .as_deref()
            .unwrap_or_else(|| Path::new(&cfg.config.sumfile)),
    );
    let jobs = args.jobs.unwrap_or(cfg.config.jobs);
    debug!(sumfile = %sumfile.display(), jobs, "build settings");

    let make = Make::new(rules, Arc::new(FileDigestStore::new(sumfile))).with_jobs(jobs);

    if args.dry_run {
        print_dry_run(&make, &targets)?;
        return Ok(());
    }

    let executor = Arc::new(
        ShellExecutor::new()
            .with_shell(cfg.config.shell.clone())
            .with_dir(&dir),
    );

    // Ctrl-C → cancel the build; digests of this run are discarded.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt received; cancelling build");
            cancel.cancel();
        });
    }

    let summary = make.make(executor, &cancel, &targets).await?;
    if summary.nothing_done() {
        info!("nothing to be done");
    }
    Ok(())
}

fn requested_targets(
    args: &CliArgs,
    cfg: &ConfigFile,
    registry: &TargetRegistry,
) -> Result<Vec<TargetRef>> {
    let references: &[String] = if args.targets.is_empty() {
        &cfg.config.default
    } else {
        &args.targets
    };
    if references.is_empty() {
        bail!("no targets requested and [config].default is empty");
    }

    let dir: PathBuf = args.directory.clone();
    references
        .iter()
        .map(|r| {
            registry
                .materialize(r, &dir)
                .with_context(|| format!("invalid target reference '{r}'"))
        })
        .collect()
}

/// Print the resolved build order, prerequisites first.
fn print_dry_run(make: &Make, targets: &[TargetRef]) -> Result<()> {
    let resolution = make.resolve(targets)?;

    println!("dagmake dry-run");
    println!("build order ({} targets):", resolution.dag.len());
    for target in resolution.dag.topological_sort() {
        let kind = if resolution.invocations.contains_key(target.name()) {
            "rule"
        } else {
            "leaf"
        };
        println!("  [{kind}] {}", target.name());
        for prereq in resolution.dag.prerequisites_of(target.name()) {
            println!("      needs: {}", prereq.name());
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
