use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use dagmake::cancel::CancelToken;
use dagmake::dag::Dag;
use dagmake::errors::MakeError;
use dagmake_test_utils::named;

// Strategy to generate an acyclic graph as prerequisite lists.
// Acyclicity is guaranteed by only letting node N depend on nodes 0..N-1.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect()
            },
        )
    })
}

fn build(prereqs: &[BTreeSet<usize>]) -> Dag {
    let mut dag = Dag::new();
    for (i, deps) in prereqs.iter().enumerate() {
        let deps: Vec<_> = deps.iter().map(|d| named(&format!("n{d}"))).collect();
        dag.add_target(&named(&format!("n{i}")), &deps);
    }
    dag
}

proptest! {
    #[test]
    fn topological_sort_is_a_valid_linearization(prereqs in dag_strategy(12)) {
        let dag = build(&prereqs);
        let order: Vec<String> = dag.topological_sort().iter().map(|t| t.name().to_string()).collect();
        prop_assert_eq!(order.len(), prereqs.len());

        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        for (i, deps) in prereqs.iter().enumerate() {
            for d in deps {
                let (prereq_at, target_at) = (pos(&format!("n{d}")), pos(&format!("n{i}")));
                prop_assert!(prereq_at < target_at, "n{} sorted after its dependent n{}", d, i);
            }
        }
    }

    #[test]
    fn walk_up_finishes_prerequisites_before_starting_dependents(
        prereqs in dag_strategy(10),
        concurrency in 0usize..4,
    ) {
        let dag = build(&prereqs);
        let log = Arc::new(Mutex::new(Vec::<String>::new()));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let walk_log = Arc::clone(&log);
        rt.block_on(dag.walk_up(concurrency, &CancelToken::new(), move |target, _cancel| {
            let log = Arc::clone(&walk_log);
            async move {
                log.lock().unwrap().push(format!("start:{}", target.name()));
                tokio::task::yield_now().await;
                log.lock().unwrap().push(format!("end:{}", target.name()));
                Ok::<(), MakeError>(())
            }
        })).unwrap();

        let log = log.lock().unwrap().clone();
        prop_assert_eq!(log.len(), 2 * prereqs.len());
        let pos = |event: String| log.iter().position(|e| *e == event).unwrap();
        for (i, deps) in prereqs.iter().enumerate() {
            prop_assert_eq!(log.iter().filter(|e| **e == format!("start:n{i}")).count(), 1);
            for d in deps {
                let (prereq_end, target_start) = (pos(format!("end:n{d}")), pos(format!("start:n{i}")));
                prop_assert!(prereq_end < target_start, "n{} started before n{} finished", i, d);
            }
        }
    }
}
