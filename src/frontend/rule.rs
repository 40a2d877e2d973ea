// src/frontend/rule.rs

//! Rules built from the TOML rule file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use crate::cancel::CancelToken;
use crate::exec::Executor;
use crate::frontend::template::{self, Bindings, Template};
use crate::rule::{BoxFuture, Invocation, Match, Rule};
use crate::target::{TargetRef, TargetRegistry};

/// What a rule does once matched: prerequisite templates plus recipe lines.
#[derive(Debug)]
struct Body {
    base: PathBuf,
    registry: &'static TargetRegistry,
    prerequisites: Vec<Template>,
    recipe: Arc<Vec<Template>>,
}

impl Body {
    fn new(
        base: &Path,
        registry: &'static TargetRegistry,
        prerequisites: &[String],
        recipe: &[String],
    ) -> Result<Self> {
        Ok(Self {
            base: base.to_path_buf(),
            registry,
            prerequisites: prerequisites
                .iter()
                .map(|p| Template::parse(p))
                .collect::<Result<_>>()?,
            recipe: Arc::new(
                recipe
                    .iter()
                    .map(|r| Template::parse(r))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn invoke(&self, target: &TargetRef, mut bindings: Bindings) -> Result<RecipeInvocation> {
        bindings.insert(template::TARGET.to_string(), target.locator().to_string());
        bindings.insert(template::TARGET_NAME.to_string(), target.name().to_string());

        let mut prerequisites = Vec::with_capacity(self.prerequisites.len());
        for tpl in &self.prerequisites {
            let reference = tpl.render(&bindings)?;
            let prereq = self
                .registry
                .materialize(&reference, &self.base)
                .with_context(|| format!("materializing prerequisite '{reference}'"))?;
            prerequisites.push(prereq);
        }

        let locators: Vec<&str> = prerequisites.iter().map(|p| p.locator()).collect();
        bindings.insert(template::PREREQUISITES.to_string(), locators.join(" "));
        for (i, locator) in locators.iter().enumerate() {
            bindings.insert(format!("{}.{i}", template::PREREQUISITES), locator.to_string());
        }

        Ok(RecipeInvocation {
            target: TargetRef::clone(target),
            prerequisites,
            bindings,
            recipe: Arc::clone(&self.recipe),
        })
    }
}

/// Implicit rule: a regex fully anchored against the target reference.
#[derive(Debug)]
pub struct PatternRule {
    pattern: String,
    regex: Regex,
    body: Body,
}

impl PatternRule {
    pub fn new(
        pattern: &str,
        prerequisites: &[String],
        recipe: &[String],
        base: &Path,
        registry: &'static TargetRegistry,
    ) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .with_context(|| format!("compiling pattern '{pattern}'"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            body: Body::new(base, registry, prerequisites, recipe)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Rule for PatternRule {
    fn match_target(&self, target: &TargetRef) -> Result<Match> {
        let Some(caps) = self.regex.captures(target.locator()) else {
            return Ok(Match::none());
        };

        let bindings: Bindings = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();

        let invocation = self
            .body
            .invoke(target, bindings)
            .with_context(|| format!("expanding pattern rule '{}'", self.pattern))?;
        Ok(Match::implicit(Arc::new(invocation)))
    }
}

/// Explicit rule: names exactly one target.
#[derive(Debug)]
pub struct ExplicitRule {
    name: String,
    body: Body,
}

impl ExplicitRule {
    pub fn new(
        target: &str,
        prerequisites: &[String],
        recipe: &[String],
        base: &Path,
        registry: &'static TargetRegistry,
    ) -> Result<Self> {
        let name = registry
            .materialize(target, base)
            .with_context(|| format!("materializing explicit target '{target}'"))?
            .name()
            .to_string();
        Ok(Self {
            name,
            body: Body::new(base, registry, prerequisites, recipe)?,
        })
    }
}

impl Rule for ExplicitRule {
    fn match_target(&self, target: &TargetRef) -> Result<Match> {
        if target.name() != self.name {
            return Ok(Match::none());
        }
        let invocation = self
            .body
            .invoke(target, Bindings::new())
            .with_context(|| format!("expanding rule for '{}'", self.name))?;
        Ok(Match::explicit(Arc::new(invocation)))
    }
}

/// A matched rule bound to one target.
pub struct RecipeInvocation {
    target: TargetRef,
    prerequisites: Vec<TargetRef>,
    bindings: Bindings,
    recipe: Arc<Vec<Template>>,
}

impl RecipeInvocation {
    /// Recipe lines with every placeholder filled in.
    pub fn commands(&self) -> Result<Vec<String>> {
        self.recipe
            .iter()
            .map(|tpl| tpl.render(&self.bindings))
            .collect()
    }
}

impl Invocation for RecipeInvocation {
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
            for tpl in self.recipe.iter() {
                cancel.check()?;
                let command = tpl.render(&self.bindings)?;
                info!(target = %self.target.name(), cmd = %command, "executing recipe");
                executor.run_command(&command, cancel).await?;
            }
            Ok(())
        })
    }
}
