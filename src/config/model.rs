// src/config/model.rs

use serde::Deserialize;

use crate::exec::shell::DEFAULT_SHELL;
use crate::store::file::DEFAULT_SUM_FILE;

/// Rule file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// jobs = 4
/// default = ["all"]
///
/// [[rule]]
/// pattern = "a\\.(?P<ext>.+)"
/// prerequisites = ["b.{{ ext }}", "c.{{ ext }}"]
/// recipe = ["cat {{ prerequisites }} > {{ target }}"]
///
/// [[rule]]
/// target = "all"
/// prerequisites = ["a.foo"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Rules in priority order (`[[rule]]` tables).
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

/// Validated rule file. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub rules: Vec<RuleConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, rules: Vec<RuleConfig>) -> Self {
        Self { config, rules }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Command prefix every recipe line is appended to.
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,

    /// Maximum number of recipes running at once; `0` = available parallelism.
    #[serde(default)]
    pub jobs: usize,

    /// Digest store location, relative to the build directory.
    #[serde(default = "default_sumfile")]
    pub sumfile: String,

    /// Targets built when none are requested on the command line.
    #[serde(default)]
    pub default: Vec<String>,
}

fn default_shell() -> Vec<String> {
    DEFAULT_SHELL.iter().map(|s| s.to_string()).collect()
}

fn default_sumfile() -> String {
    DEFAULT_SUM_FILE.to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            jobs: 0,
            sumfile: default_sumfile(),
            default: Vec::new(),
        }
    }
}

/// One `[[rule]]` table.
///
/// Exactly one of `pattern` (implicit rule) or `target` (explicit rule)
/// must be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Regular expression matched against the whole target reference.
    pub pattern: Option<String>,

    /// Exact target reference.
    pub target: Option<String>,

    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Command lines, run in order.
    #[serde(default)]
    pub recipe: Vec<String>,
}

impl RuleConfig {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match (&self.pattern, &self.target) {
            (Some(p), _) => format!("pattern '{p}'"),
            (None, Some(t)) => format!("target '{t}'"),
            (None, None) => "<unnamed rule>".to_string(),
        }
    }
}
