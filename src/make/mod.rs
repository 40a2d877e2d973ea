// src/make/mod.rs

//! Build orchestration.
//!
//! [`Make::make`] runs in two phases:
//!
//! 1. **Resolution**: breadth-first expansion of the requested targets
//!    through the configured rules into a [`Dag`], remembering the chosen
//!    [`Invocation`] per target.
//! 2. **Execution**: a single digest-store transaction around a bottom-up
//!    [`Dag::walk_up`]. Each visited target is probed, then skipped, built,
//!    or rejected (a missing target nothing can build).
//!
//! A target with a rule is rebuilt when it is missing or when its
//! prerequisites no longer match what it was last built against. Next to its
//! own digest, every ruled target records an inputs fingerprint (see
//! [`inputs_key`]) hashing the digests of its prerequisites at build time, so
//! an edit to a shared prerequisite stays visible to every dependent until
//! that dependent is rebuilt, whichever build picks it up first. Targets
//! without a recorded fingerprint fall back to "a prerequisite changed during
//! this build". Every changed or newly seen digest is written back to the
//! transaction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::dag::Dag;
use crate::errors::{MakeError, Result};
use crate::exec::Executor;
use crate::rule::{Invocation, MatchQuality, Rule};
use crate::store::{self, DigestStore, DigestWrite, Transaction};
use crate::target::{TargetRef, TargetStatus};

/// The build engine: an ordered rule list plus the digest store.
pub struct Make {
    rules: Vec<Arc<dyn Rule>>,
    store: Arc<dyn DigestStore>,
    jobs: usize,
}

/// Output of the resolution phase.
pub struct Resolution {
    pub dag: Dag,
    /// Chosen invocation per target name; targets without one are leaves.
    pub invocations: HashMap<String, Arc<dyn Invocation>>,
}

/// What a successful build did, by target name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakeSummary {
    pub executed: Vec<String>,
    pub up_to_date: Vec<String>,
}

impl MakeSummary {
    pub fn nothing_done(&self) -> bool {
        self.executed.is_empty()
    }
}

impl Make {
    pub fn new(rules: Vec<Arc<dyn Rule>>, store: Arc<dyn DigestStore>) -> Self {
        Self {
            rules,
            store,
            jobs: 0,
        }
    }

    /// Bound on concurrently running invocations; `0` means available parallelism.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// Pick the rule for `target`.
    ///
    /// The winner is the first rule, in configured order, reaching the
    /// strictly highest match priority; equal matches later on never
    /// replace it.
    pub fn rule_for(&self, target: &TargetRef) -> Result<Option<Arc<dyn Invocation>>> {
        let mut best = MatchQuality::NoMatch;
        let mut chosen = None;

        for (idx, rule) in self.rules.iter().enumerate() {
            let matched = rule
                .match_target(target)
                .map_err(|source| MakeError::Resolution {
                    target: target.name().to_string(),
                    source,
                })?;
            if matched.quality.is_match() && matched.quality.rank() > best.rank() {
                debug!(target = %target.name(), rule = idx, quality = ?matched.quality, "rule matched");
                best = matched.quality;
                chosen = matched.invocation;
            }
        }

        Ok(chosen)
    }

    /// Expand `targets` into the full dependency graph.
    ///
    /// Fails on the first rule error, and with [`MakeError::Cycle`] when the
    /// rules produce a cyclic graph.
    pub fn resolve(&self, targets: &[TargetRef]) -> Result<Resolution> {
        let mut dag = Dag::new();
        let mut invocations: HashMap<String, Arc<dyn Invocation>> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut next: VecDeque<TargetRef> = targets.iter().cloned().collect();

        while let Some(target) = next.pop_front() {
            if !seen.insert(target.name().to_string()) {
                continue;
            }

            match self.rule_for(&target)? {
                Some(invocation) => {
                    let prerequisites = invocation.prerequisites();
                    for prereq in prerequisites {
                        if !seen.contains(prereq.name()) {
                            next.push_back(TargetRef::clone(prereq));
                        }
                    }
                    dag.add_target(&target, prerequisites);
                    invocations.insert(target.name().to_string(), invocation);
                }
                None => {
                    debug!(target = %target.name(), "no rule; leaf target");
                    dag.add_target(&target, &[]);
                }
            }
        }

        if let Some(member) = dag.find_cycle() {
            return Err(MakeError::Cycle(member));
        }

        debug!(targets = dag.len(), rules = invocations.len(), "resolved dependency graph");
        Ok(Resolution { dag, invocations })
    }

    /// Bring `targets` up to date.
    ///
    /// Runs entirely inside one digest-store transaction: the recorded
    /// digests are persisted only if every step succeeds and `cancel` did
    /// not fire.
    pub async fn make(
        &self,
        executor: Arc<dyn Executor>,
        cancel: &CancelToken,
        targets: &[TargetRef],
    ) -> Result<MakeSummary> {
        let Resolution { dag, invocations } = self.resolve(targets)?;
        let summary = Arc::new(Mutex::new(MakeSummary::default()));
        let jobs = self.jobs;

        info!(targets = dag.len(), jobs, "starting build");

        let step_summary = Arc::clone(&summary);
        store::read_write(&*self.store, cancel, |tx| {
            let dag = &dag;
            async move {
                let step = Arc::new(BuildStep {
                    tx,
                    invocations,
                    executor,
                    changed: Mutex::new(HashSet::new()),
                    summary: step_summary,
                });
                dag.walk_up(jobs, cancel, move |target, cancel| {
                    let step = Arc::clone(&step);
                    async move { step.visit(target, cancel).await }
                })
                .await
            }
        })
        .await?;

        let summary = std::mem::take(&mut *lock(&summary));
        info!(
            executed = summary.executed.len(),
            up_to_date = summary.up_to_date.len(),
            "build finished"
        );
        Ok(summary)
    }
}

/// Store key holding the inputs fingerprint recorded for `target`.
pub fn inputs_key(target: &str) -> String {
    format!("{target}\0inputs")
}

/// Why a ruled target is rebuilt.
#[derive(Debug)]
enum Stale {
    Missing,
    ChangedPrerequisite(String),
    InputsMoved,
}

/// Per-build state shared by every walker action.
struct BuildStep {
    tx: Arc<Transaction>,
    invocations: HashMap<String, Arc<dyn Invocation>>,
    executor: Arc<dyn Executor>,
    /// Targets whose digest moved during this build.
    changed: Mutex<HashSet<String>>,
    summary: Arc<Mutex<MakeSummary>>,
}

impl BuildStep {
    async fn visit(&self, target: TargetRef, cancel: CancelToken) -> Result<()> {
        let name = target.name().to_string();
        let recorded = self.tx.read_value(&name);

        let status = probe(&target, &recorded)
            .await
            .map_err(|source| MakeError::Check {
                target: name.clone(),
                source,
            })?;

        let Some(invocation) = self.invocations.get(&name) else {
            if !status.exists {
                return Err(MakeError::NoRule(name));
            }
            return self.settle(name, &status, &recorded, None);
        };

        let prerequisites = invocation.prerequisites();
        let inputs = (!prerequisites.is_empty()).then(|| self.fingerprint(prerequisites));
        let built_against = self.tx.read_value(&inputs_key(&name));

        let stale = if !status.exists {
            Some(Stale::Missing)
        } else if built_against.is_empty() {
            let changed = lock(&self.changed);
            prerequisites
                .iter()
                .find(|p| changed.contains(p.name()))
                .map(|p| Stale::ChangedPrerequisite(p.name().to_string()))
        } else if matches!(&inputs, Some(fp) if *fp != built_against) {
            Some(Stale::InputsMoved)
        } else {
            None
        };

        let Some(stale) = stale else {
            let inputs = inputs.filter(|fp| *fp != built_against);
            return self.settle(name, &status, &recorded, inputs);
        };

        match &stale {
            Stale::Missing => info!(target = %name, "making missing target"),
            Stale::ChangedPrerequisite(prereq) => {
                info!(target = %name, prerequisite = %prereq, "rebuilding target")
            }
            Stale::InputsMoved => {
                info!(target = %name, "rebuilding target; prerequisites differ from its last build")
            }
        }

        cancel.check()?;
        invocation
            .execute(&*self.executor, &cancel)
            .await
            .map_err(|source| MakeError::Execution {
                target: name.clone(),
                source,
            })?;

        let fresh = probe(&target, &recorded)
            .await
            .map_err(|source| MakeError::PostCheck {
                target: name.clone(),
                source,
            })?;
        if !fresh.exists {
            warn!(target = %name, "recipe finished without producing its target");
        }

        if fresh.current_digest != recorded {
            lock(&self.changed).insert(name.clone());
        }
        let mut writes = vec![DigestWrite::new(name.clone(), fresh.current_digest)];
        if let Some(inputs) = inputs {
            writes.push(DigestWrite::new(inputs_key(&name), inputs));
        }
        self.tx.buffer_writes(writes)?;
        lock(&self.summary).executed.push(name);
        Ok(())
    }

    /// Record an existing target that is not rebuilt.
    ///
    /// `inputs` is a fingerprint still to be recorded for a ruled target.
    fn settle(
        &self,
        name: String,
        status: &TargetStatus,
        recorded: &str,
        inputs: Option<String>,
    ) -> Result<()> {
        let mut writes = Vec::new();
        if status.changed_since(recorded) {
            if self.invocations.contains_key(&name) {
                warn!(target = %name, "target changed outside the build; keeping the edited artifact");
            } else {
                debug!(target = %name, "source changed");
            }
            lock(&self.changed).insert(name.clone());
            writes.push(DigestWrite::new(name.clone(), status.current_digest.clone()));
        } else if recorded.is_empty() {
            debug!(target = %name, "recording first digest");
            writes.push(DigestWrite::new(name.clone(), status.current_digest.clone()));
        } else {
            debug!(target = %name, "target is up-to-date");
        }
        if let Some(inputs) = inputs {
            writes.push(DigestWrite::new(inputs_key(&name), inputs));
        }
        self.tx.buffer_writes(writes)?;
        lock(&self.summary).up_to_date.push(name);
        Ok(())
    }

    /// Hash of the prerequisites' names and their digests as recorded in this
    /// transaction. Prerequisites are visited first, so those digests are
    /// current.
    fn fingerprint(&self, prerequisites: &[TargetRef]) -> String {
        let names: Vec<&str> = prerequisites.iter().map(|p| p.name()).collect();
        let digests = self.tx.read_values(&names);

        let mut hasher = blake3::Hasher::new();
        for (name, digest) in names.iter().zip(&digests) {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
            hasher.update(digest.as_bytes());
            hasher.update(b"\n");
        }
        format!("i:{}", hasher.finalize().to_hex())
    }
}

/// Run the target's (blocking) status probe off the async workers.
async fn probe(target: &TargetRef, recorded: &str) -> anyhow::Result<TargetStatus> {
    let target = TargetRef::clone(target);
    let recorded = recorded.to_string();
    tokio::task::spawn_blocking(move || target.check(&recorded))
        .await
        .context("status probe task failed")?
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{BoxFuture, Match};
    use crate::store::MemoryDigestStore;
    use crate::target::Target;

    #[derive(Debug)]
    struct Leaf(String);

    impl Target for Leaf {
        fn name(&self) -> &str {
            &self.0
        }
        fn locator(&self) -> &str {
            &self.0
        }
        fn check(&self, digest: &str) -> anyhow::Result<TargetStatus> {
            Ok(TargetStatus::new(true, "x".into(), digest))
        }
    }

    struct Tagged {
        target: TargetRef,
        prereqs: Vec<TargetRef>,
    }

    impl Invocation for Tagged {
        fn target(&self) -> &TargetRef {
            &self.target
        }
        fn prerequisites(&self) -> &[TargetRef] {
            &self.prereqs
        }
        fn execute<'a>(
            &'a self,
            _executor: &'a dyn Executor,
            _cancel: &'a CancelToken,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    /// Matches every target whose name starts with `prefix`.
    #[derive(Debug)]
    struct Prefix {
        prefix: &'static str,
        quality: MatchQuality,
        prereqs: Vec<&'static str>,
    }

    impl Rule for Prefix {
        fn match_target(&self, target: &TargetRef) -> anyhow::Result<Match> {
            if !target.name().starts_with(self.prefix) {
                return Ok(Match::none());
            }
            let invocation = Arc::new(Tagged {
                target: TargetRef::clone(target),
                prereqs: self
                    .prereqs
                    .iter()
                    .map(|p| Arc::new(Leaf(p.to_string())) as TargetRef)
                    .collect(),
            });
            Ok(Match {
                quality: self.quality,
                invocation: Some(invocation),
            })
        }
    }

    /// A rule whose single prerequisite is named `tag`, so the winner is visible.
    fn rule(prefix: &'static str, quality: MatchQuality, tag: &'static str) -> Arc<dyn Rule> {
        Arc::new(Prefix {
            prefix,
            quality,
            prereqs: vec![tag],
        })
    }

    fn chosen_tag(make: &Make, name: &str) -> Option<String> {
        let target: TargetRef = Arc::new(Leaf(name.to_string()));
        make.rule_for(&target)
            .unwrap()
            .map(|inv| inv.prerequisites()[0].name().to_string())
    }

    #[test]
    fn earliest_rule_wins_ties_and_higher_priority_wins_overall() {
        let store = Arc::new(MemoryDigestStore::new());
        let make = Make::new(
            vec![
                rule("a", MatchQuality::MatchImplicit, "first-implicit"),
                rule("a", MatchQuality::MatchImplicit, "second-implicit"),
                rule("ab", MatchQuality::MatchExplicit, "explicit"),
                rule("ab", MatchQuality::MatchExplicit, "late-explicit"),
            ],
            store,
        );

        assert_eq!(chosen_tag(&make, "a.c").as_deref(), Some("first-implicit"));
        assert_eq!(chosen_tag(&make, "ab.c").as_deref(), Some("explicit"));
        assert_eq!(chosen_tag(&make, "z"), None);
    }

    #[test]
    fn resolution_rejects_cycles() {
        let store = Arc::new(MemoryDigestStore::new());
        let make = Make::new(
            vec![
                Arc::new(Prefix {
                    prefix: "x",
                    quality: MatchQuality::MatchImplicit,
                    prereqs: vec!["y"],
                }) as Arc<dyn Rule>,
                Arc::new(Prefix {
                    prefix: "y",
                    quality: MatchQuality::MatchImplicit,
                    prereqs: vec!["x"],
                }),
            ],
            store,
        );

        let target: TargetRef = Arc::new(Leaf("x".into()));
        match make.resolve(&[target]) {
            Err(MakeError::Cycle(member)) => assert!(member == "x" || member == "y"),
            Err(other) => panic!("expected a cycle error, got {other}"),
            Ok(_) => panic!("expected a cycle error"),
        }
    }
}
