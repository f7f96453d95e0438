// src/dag/state_manager.rs

//! Per-invocation state transitions for nodes in the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::graph::TaskGraph;
use crate::dag::task_info::{NodeInfo, NodeState};
use crate::task::TaskNode;

/// Manages state transitions for the nodes of one graph.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    nodes: &'a mut HashMap<String, NodeInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph, nodes: &'a mut HashMap<String, NodeInfo>) -> Self {
        Self { graph, nodes }
    }

    pub fn deps_satisfied(&self, info: &NodeInfo) -> bool {
        info.deps.iter().all(|dep| {
            self.nodes
                .get(dep)
                .is_some_and(|d| d.state.is_satisfied())
        })
    }

    /// Mark every pending transitive dependent of `failed` as aborted and
    /// return their ids.
    pub fn abort_dependents(&mut self, failed: &str) -> Vec<String> {
        let mut stack: Vec<String> = self.graph.dependents_of(failed).to_vec();
        let mut aborted = Vec::new();

        while let Some(id) = stack.pop() {
            if let Some(info) = self.nodes.get_mut(&id) {
                if info.state == NodeState::Pending {
                    info.state = NodeState::Aborted;
                    debug!(node = %id, upstream = %failed, "aborting dependent of failed node");
                    aborted.push(id.clone());
                    stack.extend(self.graph.dependents_of(&id).iter().cloned());
                }
            }
        }

        aborted
    }

    /// Collect pending nodes whose dependencies are satisfied, in execution
    /// order, mark them `Running` and return them.
    pub fn collect_new_ready(&mut self) -> Vec<Arc<TaskNode>> {
        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<String> = self
            .graph
            .order()
            .iter()
            .filter(|id| {
                self.nodes.get(*id).is_some_and(|info| {
                    info.state == NodeState::Pending && self.deps_satisfied(info)
                })
            })
            .cloned()
            .collect();

        let mut ready = Vec::new();
        for id in candidates {
            if let Some(info) = self.nodes.get_mut(&id) {
                info!(node = %id, "dependencies satisfied; scheduling node");
                info.state = NodeState::Running;
                ready.push(info.node.clone());
            }
        }
        ready
    }

    pub fn all_terminal(&self) -> bool {
        self.nodes.values().all(|info| info.state.is_terminal())
    }
}
