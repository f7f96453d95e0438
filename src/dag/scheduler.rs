// src/dag/scheduler.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{NodeInfo, NodeState};
use crate::engine::NodeOutcome;
use crate::task::TaskNode;

/// Scheduler holds the immutable graph plus the per-invocation node states.
///
/// It is responsible for:
/// - deciding when a node is ready (all dependencies done or skipped)
/// - recording completions
/// - aborting pending dependents when a node fails
///
/// It never runs anything itself: callers feed completions in and receive
/// the nodes that became ready. A node is handed out at most once.
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    nodes: HashMap<String, NodeInfo>,
    started: bool,
}

impl Scheduler {
    pub fn new(graph: TaskGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|node| {
                let deps = graph.dependencies_of(node.id()).to_vec();
                (node.id().to_string(), NodeInfo::new(node.clone(), deps))
            })
            .collect();

        Self {
            graph,
            nodes,
            started: false,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn state_of(&self, id: &str) -> Option<NodeState> {
        self.nodes.get(id).map(|info| info.state)
    }

    pub fn error_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|info| info.error.as_deref())
    }

    /// Whether every node has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.nodes.values().all(|info| info.state.is_terminal())
    }

    /// Begin the invocation and return the nodes without dependencies.
    pub fn start_run(&mut self) -> Vec<Arc<TaskNode>> {
        if self.started {
            warn!("start_run called twice; ignoring");
            return Vec::new();
        }
        self.started = true;
        info!(root = %self.graph.root(), nodes = self.graph.len(), "starting graph run");

        let mut manager = StateManager::new(&self.graph, &mut self.nodes);
        manager.collect_new_ready()
    }

    /// Record the outcome of a running node (production API).
    pub fn handle_completion(&mut self, id: &str, outcome: NodeOutcome) -> Vec<Arc<TaskNode>> {
        self.step_completion(id, outcome).newly_scheduled
    }

    /// Manual-step variant of `handle_completion` that returns a rich
    /// [`SchedulerStep`].
    pub fn step_completion(&mut self, id: &str, outcome: NodeOutcome) -> SchedulerStep {
        let mut newly_scheduled = Vec::new();
        let mut newly_aborted = Vec::new();

        match self.nodes.get_mut(id) {
            Some(info) if info.state == NodeState::Running => match outcome {
                NodeOutcome::Done | NodeOutcome::Skipped => {
                    info.state = if matches!(outcome, NodeOutcome::Done) {
                        NodeState::Done
                    } else {
                        NodeState::Skipped
                    };
                    debug!(node = %id, state = %info.state, "node finished");
                    let mut manager = StateManager::new(&self.graph, &mut self.nodes);
                    newly_scheduled = manager.collect_new_ready();
                }
                NodeOutcome::Failed(message) => {
                    info.state = NodeState::Failed;
                    warn!(node = %id, error = %message, "node failed; aborting pending dependents");
                    info.error = Some(message);
                    let mut manager = StateManager::new(&self.graph, &mut self.nodes);
                    newly_aborted = manager.abort_dependents(id);
                }
            },
            Some(info) => {
                warn!(node = %id, state = %info.state, "completion for node that is not running; ignoring");
            }
            None => {
                warn!(node = %id, "completion for unknown node; ignoring");
            }
        }

        let run_finished = StateManager::new(&self.graph, &mut self.nodes).all_terminal();
        if run_finished {
            info!(root = %self.graph.root(), "all nodes terminal; graph run finished");
        }

        SchedulerStep {
            newly_scheduled,
            newly_aborted,
            run_finished,
        }
    }
}
