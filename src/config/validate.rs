// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile, RuleConfig};
use crate::errors::{MakeError, Result};
use crate::frontend::template::{self, Template};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = MakeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.rules))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_rules(cfg)?;
    validate_global_config(cfg)?;
    for (idx, rule) in cfg.rules.iter().enumerate() {
        validate_rule(idx, rule)?;
    }
    Ok(())
}

fn ensure_has_rules(cfg: &RawConfigFile) -> Result<()> {
    if cfg.rules.is_empty() {
        return Err(MakeError::Config(
            "rule file must contain at least one [[rule]] table".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.shell.is_empty() {
        return Err(MakeError::Config(
            "[config].shell must name at least a program".to_string(),
        ));
    }
    if cfg.config.sumfile.trim().is_empty() {
        return Err(MakeError::Config(
            "[config].sumfile must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_rule(idx: usize, rule: &RuleConfig) -> Result<()> {
    let capture_names: Vec<String> = match (&rule.pattern, &rule.target) {
        (Some(_), Some(_)) => {
            return Err(MakeError::Config(format!(
                "rule #{idx} sets both `pattern` and `target`; pick one"
            )));
        }
        (None, None) => {
            return Err(MakeError::Config(format!(
                "rule #{idx} needs either `pattern` or `target`"
            )));
        }
        (Some(pattern), None) => {
            let re = Regex::new(pattern).map_err(|e| {
                MakeError::Config(format!("rule #{idx} has an invalid pattern '{pattern}': {e}"))
            })?;
            re.capture_names().flatten().map(str::to_string).collect()
        }
        (None, Some(target)) => {
            if target.trim().is_empty() {
                return Err(MakeError::Config(format!(
                    "rule #{idx} has an empty `target`"
                )));
            }
            Vec::new()
        }
    };

    let mut match_names: Vec<&str> = vec![template::TARGET, template::TARGET_NAME];
    match_names.extend(capture_names.iter().map(String::as_str));

    for source in &rule.prerequisites {
        let tpl = parse(idx, rule, source)?;
        if let Some(unknown) = tpl.placeholders().find(|n| !match_names.contains(n)) {
            return Err(unknown_placeholder(idx, rule, source, unknown));
        }
    }

    let n_prereqs = rule.prerequisites.len();
    for source in &rule.recipe {
        let tpl = parse(idx, rule, source)?;
        if let Some(unknown) = tpl
            .placeholders()
            .find(|n| !template::is_known_recipe_name(n, &match_names, n_prereqs))
        {
            return Err(unknown_placeholder(idx, rule, source, unknown));
        }
    }

    Ok(())
}

fn parse(idx: usize, rule: &RuleConfig, source: &str) -> Result<Template> {
    Template::parse(source)
        .map_err(|e| MakeError::Config(format!("rule #{idx} ({}): {e}", rule.describe())))
}

fn unknown_placeholder(idx: usize, rule: &RuleConfig, source: &str, name: &str) -> MakeError {
    MakeError::Config(format!(
        "rule #{idx} ({}) uses unknown placeholder '{name}' in '{source}'",
        rule.describe()
    ))
}
