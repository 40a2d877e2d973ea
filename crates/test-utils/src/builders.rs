#![allow(dead_code)]

use dagmake::config::{ConfigFile, ConfigSection, RawConfigFile, RuleConfig};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                rules: Vec::new(),
            },
        }
    }

    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.config.rules.push(rule);
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.config.config.jobs = jobs;
        self
    }

    pub fn with_default_target(mut self, target: &str) -> Self {
        self.config.config.default.push(target.to_string());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// The unvalidated file, for tests exercising validation itself.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RuleConfig`.
pub struct RuleConfigBuilder {
    rule: RuleConfig,
}

impl RuleConfigBuilder {
    /// Implicit rule matching `pattern`.
    pub fn pattern(pattern: &str) -> Self {
        Self {
            rule: RuleConfig {
                pattern: Some(pattern.to_string()),
                ..RuleConfig::default()
            },
        }
    }

    /// Explicit rule for `target`.
    pub fn target(target: &str) -> Self {
        Self {
            rule: RuleConfig {
                target: Some(target.to_string()),
                ..RuleConfig::default()
            },
        }
    }

    pub fn prereq(mut self, reference: &str) -> Self {
        self.rule.prerequisites.push(reference.to_string());
        self
    }

    pub fn recipe(mut self, line: &str) -> Self {
        self.rule.recipe.push(line.to_string());
        self
    }

    pub fn build(self) -> RuleConfig {
        self.rule
    }
}
