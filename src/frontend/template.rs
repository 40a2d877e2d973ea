// src/frontend/template.rs

//! `{{ name }}` placeholder templates for prerequisites and recipes.
//!
//! Names are looked up in a flat [`Bindings`] map; there is no expression
//! language. A literal `{{` that does not close is a parse error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;

/// Name → value map used to render templates.
pub type Bindings = BTreeMap<String, String>;

pub const TARGET: &str = "target";
pub const TARGET_NAME: &str = "target.name";
pub const PREREQUISITES: &str = "prerequisites";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("placeholder regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Placeholder(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parts = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            push_literal(&mut parts, source, &source[last..whole.start()])?;
            parts.push(Part::Placeholder(name.as_str().to_string()));
            last = whole.end();
        }
        push_literal(&mut parts, source, &source[last..])?;

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Placeholder(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(name) => {
                    let value = bindings.get(name).ok_or_else(|| {
                        anyhow!("unknown placeholder '{{{{ {name} }}}}' in '{}'", self.source)
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({:?})", self.source)
    }
}

fn push_literal(parts: &mut Vec<Part>, source: &str, text: &str) -> Result<()> {
    if text.contains("{{") || text.contains("}}") {
        bail!("malformed placeholder in '{source}'");
    }
    if !text.is_empty() {
        parts.push(Part::Literal(text.to_string()));
    }
    Ok(())
}

/// Is `name` bound for a recipe with `n_prereqs` prerequisites, given the
/// names bound during matching?
pub fn is_known_recipe_name(name: &str, match_names: &[&str], n_prereqs: usize) -> bool {
    if match_names.contains(&name) || name == PREREQUISITES {
        return true;
    }
    prerequisite_index(name).is_some_and(|i| i < n_prereqs)
}

/// `prerequisites.N` → `Some(N)`.
pub fn prerequisite_index(name: &str) -> Option<usize> {
    name.strip_prefix("prerequisites.")?.parse().ok()
}
