#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dagmake::config::load_and_validate;
use dagmake::frontend::build_rules;
use dagmake::make::Make;
use dagmake::store::FileDigestStore;
use dagmake::target::{TargetRef, TargetRegistry};

pub use dagmake_test_utils::{init_tracing, with_timeout};

/// Rule file used by the shell scenarios: `a.<ext>` concatenates `b.<ext>`
/// and `c.<ext>`, which are written by their own recipes.
pub const ABC_RULES: &str = r#"
[config]
jobs = 2

[[rule]]
pattern = 'a\.(?P<ext>.+)'
prerequisites = ["b.{{ ext }}", "c.{{ ext }}"]
recipe = ["cat {{ prerequisites }} > {{ target }}"]

[[rule]]
pattern = 'b\.(?P<ext>.+)'
recipe = ["echo b > {{ target }}"]

[[rule]]
pattern = 'c\.(?P<ext>.+)'
recipe = ["echo c > {{ target }}"]
"#;

/// Write `contents` as `dagmake.toml` in `dir` and return its path.
pub fn write_rule_file(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("dagmake.toml");
    fs::write(&path, contents).expect("write rule file");
    path
}

/// Build a file-backed `Make` from the rule file in `dir`.
pub fn make_from_dir(dir: &Path) -> Make {
    let cfg = load_and_validate(dir.join("dagmake.toml")).expect("valid rule file");
    let rules = build_rules(&cfg, dir, TargetRegistry::global()).expect("rules build");
    let store = Arc::new(FileDigestStore::new(dir.join(&cfg.config.sumfile)));
    Make::new(rules, store).with_jobs(cfg.config.jobs)
}

pub fn file_target(dir: &Path, reference: &str) -> TargetRef {
    TargetRegistry::global()
        .materialize(reference, dir)
        .expect("file target")
}
