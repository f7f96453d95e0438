// tests/property_scheduler.rs

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;

use scandag::dag::{NodeState, Scheduler, TaskGraph};
use scandag::engine::NodeOutcome;
use scandag::task::identity::node_identity;
use scandag::task::{ParamSchema, ParamSpec, Params, TaskContext, TaskNode};
use scandag::types::TaskKind;

fn noop(_ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    Ok(())
}

// Acyclic by construction: task i may only depend on tasks 0..i.
// A final "root" node depends on every task so the whole DAG is reachable.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, deps)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        deps.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect()
        })
    })
}

fn build_graph(deps: &[BTreeSet<usize>]) -> TaskGraph {
    let mut nodes: Vec<Arc<TaskNode>> = Vec::new();
    for (i, upstream) in deps.iter().enumerate() {
        let upstream = upstream.iter().map(|&d| nodes[d].clone()).collect();
        nodes.push(Arc::new(TaskNode::new(
            format!("task_{i}"),
            Params::default(),
            upstream,
            TaskKind::Producer,
            Arc::new(noop),
        )));
    }
    let root = Arc::new(TaskNode::new(
        "root",
        Params::default(),
        nodes,
        TaskKind::SideEffect,
        Arc::new(noop),
    ));
    TaskGraph::from_root(&root).expect("generated graph is acyclic")
}

fn threshold_params(level: i64, mode: &str) -> Params {
    let schema = ParamSchema::new()
        .param(ParamSpec::int("level", 1))
        .param(ParamSpec::string("mode", "fast"))
        .param(ParamSpec::string("note", "").insignificant());
    let section: toml::Table = toml::from_str(&format!("level = {level}\nmode = {mode:?}\nnote = {mode:?}"))
        .expect("valid section");
    schema.resolve("Threshold", Some(&section)).expect("valid params")
}

proptest! {
    #[test]
    fn scheduler_terminates_and_runs_each_node_at_most_once(
        deps in dag_strategy(10),
        failing in proptest::collection::btree_set(0..10usize, 0..4),
        skipped in proptest::collection::btree_set(0..10usize, 0..4),
    ) {
        let graph = build_graph(&deps);
        let total = graph.len();
        prop_assert_eq!(total, deps.len() + 1);

        let mut scheduler = Scheduler::new(graph);
        let mut runs: HashMap<String, usize> = HashMap::new();
        let mut queue: VecDeque<_> = scheduler.start_run().into();
        let mut steps = 0;

        while let Some(node) = queue.pop_front() {
            steps += 1;
            prop_assert!(steps <= total, "more dispatches than nodes");

            // Every dependency is satisfied when a node is released.
            for dep in scheduler.graph().dependencies_of(node.id()) {
                let state = scheduler.state_of(dep);
                prop_assert!(state.is_some_and(NodeState::is_satisfied), "{} released before {}", node.id(), dep);
            }
            *runs.entry(node.id().to_string()).or_default() += 1;

            let index = node.family().strip_prefix("task_").and_then(|i| i.parse::<usize>().ok());
            let outcome = match index {
                Some(i) if failing.contains(&i) => NodeOutcome::Failed("injected".into()),
                Some(i) if skipped.contains(&i) => NodeOutcome::Skipped,
                _ => NodeOutcome::Done,
            };
            queue.extend(scheduler.handle_completion(node.id(), outcome));
        }

        prop_assert!(scheduler.is_finished());
        prop_assert!(runs.values().all(|&n| n == 1));

        for id in scheduler.graph().order() {
            let state = scheduler.state_of(id);
            if state == Some(NodeState::Failed) || state == Some(NodeState::Aborted) {
                for dependent in scheduler.graph().dependents_of(id) {
                    prop_assert_eq!(scheduler.state_of(dependent), Some(NodeState::Aborted));
                }
            }
        }
    }

    #[test]
    fn identity_depends_only_on_significant_values(
        level in -1000i64..1000,
        other in -1000i64..1000,
        mode in "[a-z]{1,12}",
    ) {
        let a = node_identity("Threshold", &threshold_params(level, &mode));
        let b = node_identity("Threshold", &threshold_params(level, &mode));
        prop_assert_eq!(&a, &b);
        prop_assert!(a.starts_with("Threshold_"));

        let c = node_identity("Threshold", &threshold_params(other, &mode));
        prop_assert_eq!(level == other, a == c);

        let d = node_identity("Otsu", &threshold_params(level, &mode));
        prop_assert_ne!(a, d);
    }
}
