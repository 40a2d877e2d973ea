// src/frontend/mod.rs

//! Turns a validated rule file into engine [`Rule`]s.
//!
//! - [`rule`] holds [`PatternRule`], [`ExplicitRule`] and the invocation
//!   they produce.
//! - [`template`] implements `{{ name }}` placeholder expansion.

pub mod rule;
pub mod template;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigFile;
use crate::errors::{MakeError, Result};
use crate::rule::Rule;
use crate::target::TargetRegistry;

pub use rule::{ExplicitRule, PatternRule, RecipeInvocation};
pub use template::Template;

/// Build the ordered rule list for a build rooted at `base`.
pub fn build_rules(
    cfg: &ConfigFile,
    base: &Path,
    registry: &'static TargetRegistry,
) -> Result<Vec<Arc<dyn Rule>>> {
    let mut rules: Vec<Arc<dyn Rule>> = Vec::with_capacity(cfg.rules.len());

    for (idx, raw) in cfg.rules.iter().enumerate() {
        let built: anyhow::Result<Arc<dyn Rule>> = match (&raw.pattern, &raw.target) {
            (Some(pattern), _) => {
                PatternRule::new(pattern, &raw.prerequisites, &raw.recipe, base, registry)
                    .map(|r| Arc::new(r) as Arc<dyn Rule>)
            }
            (None, Some(target)) => {
                ExplicitRule::new(target, &raw.prerequisites, &raw.recipe, base, registry)
                    .map(|r| Arc::new(r) as Arc<dyn Rule>)
            }
            (None, None) => Err(anyhow::anyhow!("rule has neither pattern nor target")),
        };

        let rule = built
            .map_err(|e| MakeError::Config(format!("rule #{idx} ({}): {e:#}", raw.describe())))?;
        debug!(rule = idx, kind = %raw.describe(), "built rule");
        rules.push(rule);
    }

    Ok(rules)
}
