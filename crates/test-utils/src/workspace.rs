//! In-memory artifacts and scripted rules for engine tests.
//!
//! A [`MemWorkspace`] is a fake filesystem: a map from locator to contents
//! plus an execution log. [`ScriptRule`] builds rules whose recipes act on
//! that map, so whole builds run without touching disk or spawning shells.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use regex::Regex;

use dagmake::cancel::CancelToken;
use dagmake::exec::Executor;
use dagmake::rule::{BoxFuture, Invocation, Match, MatchQuality, Rule};
use dagmake::target::{Target, TargetRef, TargetStatus};

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, String>,
    executions: Vec<String>,
    broken: HashSet<String>,
}

/// Shared fake filesystem. Clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct MemWorkspace {
    state: Arc<Mutex<State>>,
}

impl MemWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Target handle for `locator`, named `mem:<locator>`.
    pub fn target(&self, locator: &str) -> TargetRef {
        Arc::new(MemTarget {
            ws: self.clone(),
            locator: locator.to_string(),
            name: format!("mem:{locator}"),
        })
    }

    pub fn write(&self, locator: &str, contents: &str) {
        self.lock()
            .files
            .insert(locator.to_string(), contents.to_string());
    }

    pub fn read(&self, locator: &str) -> Option<String> {
        self.lock().files.get(locator).cloned()
    }

    pub fn remove(&self, locator: &str) {
        self.lock().files.remove(locator);
    }

    /// Locators whose recipe ran, in start order.
    pub fn executions(&self) -> Vec<String> {
        self.lock().executions.clone()
    }

    pub fn clear_executions(&self) {
        self.lock().executions.clear();
    }

    /// Make every status probe of `locator` fail with an I/O-style error.
    pub fn break_checks_for(&self, locator: &str) {
        self.lock().broken.insert(locator.to_string());
    }
}

/// Artifact living in a [`MemWorkspace`].
pub struct MemTarget {
    ws: MemWorkspace,
    locator: String,
    name: String,
}

impl fmt::Debug for MemTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemTarget({})", self.name)
    }
}

impl Target for MemTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn locator(&self) -> &str {
        &self.locator
    }

    fn check(&self, digest: &str) -> Result<TargetStatus> {
        let state = self.ws.lock();
        if state.broken.contains(&self.locator) {
            bail!("simulated I/O failure probing {}", self.locator);
        }
        Ok(match state.files.get(&self.locator) {
            Some(contents) => {
                let current = format!("m:{}", blake3::hash(contents.as_bytes()).to_hex());
                TargetStatus::new(true, current, digest)
            }
            None => TargetStatus::missing(),
        })
    }
}

/// Target that always exists with a fixed digest. Handy for pure graph tests.
pub fn named(name: &str) -> TargetRef {
    Arc::new(Named(name.to_string()))
}

#[derive(Debug)]
struct Named(String);

impl Target for Named {
    fn name(&self) -> &str {
        &self.0
    }

    fn locator(&self) -> &str {
        &self.0
    }

    fn check(&self, digest: &str) -> Result<TargetStatus> {
        Ok(TargetStatus::new(true, format!("n:{}", self.0), digest))
    }
}

/// What a scripted recipe does to its target.
#[derive(Debug, Clone)]
pub enum Action {
    /// Write fixed contents.
    Write(String),
    /// Write the concatenation of every prerequisite's contents.
    Concat,
    /// Fail with this message without writing anything.
    Fail(String),
    /// Run without producing anything.
    Nothing,
}

/// Builder for rules over a [`MemWorkspace`].
///
/// Prerequisite references use `regex` replacement syntax, e.g. `b.${ext}`.
#[derive(Debug, Clone)]
pub struct ScriptRule {
    ws: MemWorkspace,
    regex: Regex,
    quality: MatchQuality,
    prerequisites: Vec<String>,
    action: Action,
    delay: Option<Duration>,
}

impl ScriptRule {
    /// Implicit rule for locators fully matching `pattern`.
    pub fn pattern(ws: &MemWorkspace, pattern: &str) -> Self {
        Self::with_quality(ws, &format!("^(?:{pattern})$"), MatchQuality::MatchImplicit)
    }

    /// Explicit rule for exactly `locator`.
    pub fn explicit(ws: &MemWorkspace, locator: &str) -> Self {
        Self::with_quality(
            ws,
            &format!("^{}$", regex::escape(locator)),
            MatchQuality::MatchExplicit,
        )
    }

    fn with_quality(ws: &MemWorkspace, regex: &str, quality: MatchQuality) -> Self {
        Self {
            ws: ws.clone(),
            regex: Regex::new(regex).unwrap(),
            quality,
            prerequisites: Vec::new(),
            action: Action::Nothing,
            delay: None,
        }
    }

    pub fn prereq(mut self, reference: &str) -> Self {
        self.prerequisites.push(reference.to_string());
        self
    }

    pub fn writes(mut self, contents: &str) -> Self {
        self.action = Action::Write(contents.to_string());
        self
    }

    pub fn concat(mut self) -> Self {
        self.action = Action::Concat;
        self
    }

    pub fn fails(mut self, message: &str) -> Self {
        self.action = Action::Fail(message.to_string());
        self
    }

    /// Sleep before acting, to widen race windows.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn build(self) -> Arc<dyn Rule> {
        Arc::new(self)
    }
}

impl Rule for ScriptRule {
    fn match_target(&self, target: &TargetRef) -> Result<Match> {
        let Some(caps) = self.regex.captures(target.locator()) else {
            return Ok(Match::none());
        };

        let prerequisites = self
            .prerequisites
            .iter()
            .map(|reference| {
                let mut locator = String::new();
                caps.expand(reference, &mut locator);
                self.ws.target(&locator)
            })
            .collect();

        Ok(Match {
            quality: self.quality,
            invocation: Some(Arc::new(ScriptInvocation {
                ws: self.ws.clone(),
                target: TargetRef::clone(target),
                prerequisites,
                action: self.action.clone(),
                delay: self.delay,
            })),
        })
    }
}

struct ScriptInvocation {
    ws: MemWorkspace,
    target: TargetRef,
    prerequisites: Vec<TargetRef>,
    action: Action,
    delay: Option<Duration>,
}

impl Invocation for ScriptInvocation {
    fn target(&self) -> &TargetRef {
        &self.target
    }

    fn prerequisites(&self) -> &[TargetRef] {
        &self.prerequisites
    }

    fn execute<'a>(
        &'a self,
        executor: &'a dyn Executor,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            cancel.check()?;
            let locator = self.target.locator();
            self.ws.lock().executions.push(locator.to_string());
            executor.run_command(&format!("make {locator}"), cancel).await?;

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match &self.action {
                Action::Write(contents) => self.ws.write(locator, contents),
                Action::Concat => {
                    let mut out = String::new();
                    for prereq in &self.prerequisites {
                        let contents = self
                            .ws
                            .read(prereq.locator())
                            .ok_or_else(|| anyhow!("missing prerequisite {}", prereq.locator()))?;
                        out.push_str(&contents);
                    }
                    self.ws.write(locator, &out);
                }
                Action::Fail(message) => bail!("{message}"),
                Action::Nothing => {}
            }
            Ok(())
        })
    }
}
