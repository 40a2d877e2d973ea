mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dagmake::cancel::CancelToken;
use dagmake::errors::MakeError;
use dagmake::frontend::PatternRule;
use dagmake::make::{Make, MakeSummary, inputs_key};
use dagmake::rule::Rule;
use dagmake::store::MemoryDigestStore;
use dagmake::target::TargetRegistry;
use dagmake_test_utils::{MemWorkspace, RecordingExecutor, ScriptRule};

type TestResult = Result<(), Box<dyn Error>>;

/// `a.<ext>` = `b.<ext>` + `c.<ext>`; `b.<ext>` = "b\n"; `c.<ext>` = "c\n".
fn abc_rules(ws: &MemWorkspace) -> Vec<Arc<dyn Rule>> {
    vec![
        ScriptRule::pattern(ws, r"a\.(?P<ext>.+)")
            .prereq("b.${ext}")
            .prereq("c.${ext}")
            .concat()
            .build(),
        ScriptRule::pattern(ws, r"b\.(?P<ext>.+)").writes("b\n").build(),
        ScriptRule::pattern(ws, r"c\.(?P<ext>.+)").writes("c\n").build(),
    ]
}

struct Harness {
    ws: MemWorkspace,
    store: Arc<MemoryDigestStore>,
    exec: RecordingExecutor,
    make: Make,
}

impl Harness {
    fn new(ws: MemWorkspace, rules: Vec<Arc<dyn Rule>>) -> Self {
        let store = Arc::new(MemoryDigestStore::new());
        let make = Make::new(rules, store.clone()).with_jobs(4);
        Self {
            ws,
            store,
            exec: RecordingExecutor::new(),
            make,
        }
    }

    async fn build(&self, locators: &[&str]) -> Result<MakeSummary, MakeError> {
        self.ws.clear_executions();
        let targets: Vec<_> = locators.iter().map(|l| self.ws.target(l)).collect();
        with_timeout(self.make.make(
            Arc::new(self.exec.clone()),
            &CancelToken::new(),
            &targets,
        ))
        .await
    }
}

#[tokio::test]
async fn scenario_builds_everything_once_then_nothing() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let h = Harness::new(ws.clone(), abc_rules(&ws));

    let summary = h.build(&["a.foo"]).await?;
    let mut executed = ws.executions();
    executed.sort();
    assert_eq!(executed, ["a.foo", "b.foo", "c.foo"]);
    assert_eq!(summary.executed.len(), 3);
    assert_eq!(ws.read("b.foo").as_deref(), Some("b\n"));
    assert_eq!(ws.read("c.foo").as_deref(), Some("c\n"));
    assert_eq!(ws.read("a.foo").as_deref(), Some("b\nc\n"));
    assert_eq!(h.store.flush_count(), 1);
    // Three digests plus the inputs fingerprint of `a.foo`, the only target
    // with prerequisites.
    let recorded = h.store.snapshot();
    assert_eq!(recorded.len(), 4);
    assert!(recorded.contains_key(&inputs_key("mem:a.foo")));
    assert!(!recorded.contains_key(&inputs_key("mem:b.foo")));
    assert!(h.exec.commands().contains(&"make a.foo".to_string()));

    let summary = h.build(&["a.foo"]).await?;
    assert!(ws.executions().is_empty());
    assert!(summary.nothing_done());
    assert_eq!(summary.up_to_date.len(), 3);
    assert_eq!(ws.read("a.foo").as_deref(), Some("b\nc\n"));
    // Nothing changed, so nothing was buffered and nothing flushed.
    assert_eq!(h.store.flush_count(), 1);
    Ok(())
}

#[tokio::test]
async fn editing_a_prerequisite_rebuilds_only_its_dependent() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let h = Harness::new(ws.clone(), abc_rules(&ws));
    h.build(&["a.foo"]).await?;

    ws.write("b.foo", "B\n");
    h.build(&["a.foo"]).await?;

    assert_eq!(ws.executions(), ["a.foo"]);
    assert_eq!(ws.read("a.foo").as_deref(), Some("B\nc\n"));
    assert_eq!(ws.read("b.foo").as_deref(), Some("B\n"));

    h.build(&["a.foo"]).await?;
    assert!(ws.executions().is_empty(), "edit was recorded");
    Ok(())
}

#[tokio::test]
async fn regenerating_identical_output_does_not_ripple() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let h = Harness::new(ws.clone(), abc_rules(&ws));
    h.build(&["a.foo"]).await?;

    ws.remove("c.foo");
    h.build(&["a.foo"]).await?;

    assert_eq!(ws.executions(), ["c.foo"]);
    assert_eq!(ws.read("c.foo").as_deref(), Some("c\n"));
    Ok(())
}

#[tokio::test]
async fn missing_leaf_without_rule_fails_before_any_execution() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let rules = vec![
        ScriptRule::pattern(&ws, r"out\.(?P<ext>.+)")
            .prereq("src.${ext}")
            .concat()
            .build(),
    ];
    let h = Harness::new(ws.clone(), rules);

    match h.build(&["out.x"]).await {
        Err(MakeError::NoRule(target)) => assert_eq!(target, "mem:src.x"),
        other => panic!("expected NoRule, got {other:?}"),
    }
    assert!(ws.executions().is_empty());
    assert_eq!(h.store.flush_count(), 0);

    match h.build(&["nothing"]).await {
        Err(MakeError::NoRule(target)) => assert_eq!(target, "mem:nothing"),
        other => panic!("expected NoRule, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn untracked_sources_are_up_to_date_and_recorded() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    ws.write("src.x", "hello");
    let rules = vec![
        ScriptRule::pattern(&ws, r"out\.(?P<ext>.+)")
            .prereq("src.${ext}")
            .concat()
            .build(),
    ];
    let h = Harness::new(ws.clone(), rules);

    h.build(&["out.x"]).await?;
    assert_eq!(ws.executions(), ["out.x"]);
    assert!(h.store.snapshot().contains_key("mem:src.x"));

    h.build(&["out.x"]).await?;
    assert!(ws.executions().is_empty());

    ws.write("src.x", "hello again");
    h.build(&["out.x"]).await?;
    assert_eq!(ws.executions(), ["out.x"]);
    assert_eq!(ws.read("out.x").as_deref(), Some("hello again"));
    Ok(())
}

#[tokio::test]
async fn shared_prerequisite_edit_reaches_dependents_built_later() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    ws.write("s", "v1");
    let rules = vec![
        ScriptRule::explicit(&ws, "x").prereq("s").concat().build(),
        ScriptRule::explicit(&ws, "y").prereq("s").concat().build(),
    ];
    let h = Harness::new(ws.clone(), rules);
    h.build(&["x", "y"]).await?;

    ws.write("s", "v2");
    h.build(&["x"]).await?;
    assert_eq!(ws.executions(), ["x"]);
    assert_eq!(ws.read("x").as_deref(), Some("v2"));

    // `s` is now recorded as "v2", yet `y` was built against "v1".
    h.build(&["y"]).await?;
    assert_eq!(ws.executions(), ["y"]);
    assert_eq!(ws.read("y").as_deref(), Some("v2"));

    h.build(&["x", "y"]).await?;
    assert!(ws.executions().is_empty());
    Ok(())
}

#[tokio::test]
async fn hand_edited_output_is_kept_until_its_inputs_change() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    ws.write("src", "one");
    let rules = vec![ScriptRule::explicit(&ws, "out").prereq("src").concat().build()];
    let h = Harness::new(ws.clone(), rules);
    h.build(&["out"]).await?;

    ws.write("out", "tampered");
    let summary = h.build(&["out"]).await?;
    assert!(ws.executions().is_empty());
    assert_eq!(summary.up_to_date, ["mem:src", "mem:out"]);
    assert_eq!(ws.read("out").as_deref(), Some("tampered"));

    // The edit is recorded, so the next build does not report it again.
    h.build(&["out"]).await?;
    assert!(ws.executions().is_empty());

    ws.write("src", "two");
    h.build(&["out"]).await?;
    assert_eq!(ws.executions(), ["out"]);
    assert_eq!(ws.read("out").as_deref(), Some("two"));
    Ok(())
}

#[tokio::test]
async fn earlier_rule_wins_between_equal_matches() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let rules = vec![
        ScriptRule::pattern(&ws, "t.*").writes("first").build(),
        ScriptRule::pattern(&ws, "t").writes("second").build(),
    ];
    let h = Harness::new(ws.clone(), rules);

    h.build(&["t"]).await?;
    assert_eq!(ws.read("t").as_deref(), Some("first"));
    Ok(())
}

#[tokio::test]
async fn explicit_rule_outranks_earlier_pattern() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let rules = vec![
        ScriptRule::pattern(&ws, ".*").writes("pattern").build(),
        ScriptRule::explicit(&ws, "t").writes("explicit").build(),
    ];
    let h = Harness::new(ws.clone(), rules);

    h.build(&["t"]).await?;
    assert_eq!(ws.read("t").as_deref(), Some("explicit"));
    Ok(())
}

#[tokio::test]
async fn failed_recipe_aborts_and_discards_every_digest() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let rules = vec![
        ScriptRule::pattern(&ws, "a")
            .prereq("b")
            .prereq("c")
            .concat()
            .build(),
        ScriptRule::pattern(&ws, "b").writes("b").build(),
        ScriptRule::pattern(&ws, "c")
            .delay(Duration::from_millis(10))
            .fails("compiler exploded")
            .build(),
    ];
    let h = Harness::new(ws.clone(), rules);

    match h.build(&["a"]).await {
        Err(MakeError::Execution { target, source }) => {
            assert_eq!(target, "mem:c");
            assert!(source.to_string().contains("compiler exploded"));
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
    assert!(!ws.executions().contains(&"a".to_string()));
    assert_eq!(h.store.flush_count(), 0);
    assert!(h.store.snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn probe_failures_are_wrapped_with_the_target() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    ws.break_checks_for("b.foo");
    let h = Harness::new(ws.clone(), abc_rules(&ws));

    match h.build(&["a.foo"]).await {
        Err(MakeError::Check { target, .. }) => assert_eq!(target, "mem:b.foo"),
        other => panic!("expected a check error, got {other:?}"),
    }
    assert!(!ws.executions().contains(&"a.foo".to_string()));
    Ok(())
}

#[tokio::test]
async fn external_cancellation_discards_digests() -> TestResult {
    init_tracing();
    let ws = MemWorkspace::new();
    let rules = vec![
        ScriptRule::pattern(&ws, "a").prereq("b").concat().build(),
        ScriptRule::pattern(&ws, "b")
            .delay(Duration::from_millis(50))
            .writes("b")
            .build(),
    ];
    let store = Arc::new(MemoryDigestStore::new());
    let make = Make::new(rules, store.clone());
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = with_timeout(make.make(
        Arc::new(RecordingExecutor::new()),
        &cancel,
        &[ws.target("a")],
    ))
    .await;

    assert!(matches!(result, Err(MakeError::Cancelled)), "got {result:?}");
    assert_eq!(ws.executions(), ["b"]);
    assert_eq!(store.flush_count(), 0);
    Ok(())
}

#[tokio::test]
async fn rule_errors_abort_resolution() -> TestResult {
    init_tracing();
    let base = Path::new("/work");
    let rule = PatternRule::new(
        r"a\.(?P<ext>.+)",
        &["b.{{ stem }}".to_string()],
        &[],
        base,
        TargetRegistry::global(),
    )?;
    let rules: Vec<Arc<dyn Rule>> = vec![Arc::new(rule)];
    let make = Make::new(rules, Arc::new(MemoryDigestStore::new()));
    let target = TargetRegistry::global().materialize("a.foo", base)?;

    match make.resolve(&[target]) {
        Err(MakeError::Resolution { target, .. }) => assert_eq!(target, "file:a.foo"),
        Err(other) => panic!("expected a resolution error, got {other}"),
        Ok(_) => panic!("expected a resolution error"),
    }
    Ok(())
}

#[tokio::test]
async fn resolution_builds_the_full_graph() -> TestResult {
    let ws = MemWorkspace::new();
    let h = Harness::new(ws.clone(), abc_rules(&ws));

    let resolution = h.make.resolve(&[ws.target("a.foo"), ws.target("b.foo")])?;
    assert_eq!(resolution.dag.len(), 3);
    assert_eq!(resolution.invocations.len(), 3);
    let prereqs: Vec<&str> = resolution
        .dag
        .prerequisites_of("mem:a.foo")
        .iter()
        .map(|t| t.name())
        .collect();
    assert_eq!(prereqs, ["mem:b.foo", "mem:c.foo"]);
    assert!(ws.executions().is_empty());
    Ok(())
}
