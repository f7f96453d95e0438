// src/dag/task_info.rs

//! Per-node state for one invocation.

use std::fmt;
use std::sync::Arc;

use crate::task::TaskNode;

/// State of a node during one invocation.
///
/// `Pending -> Running -> {Done | Skipped | Failed}`; a pending node whose
/// upstream failed becomes `Aborted` without ever running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    /// `run()` finished successfully in this invocation.
    Done,
    /// Output was already complete; `run()` was not invoked.
    Skipped,
    Failed,
    /// Not started because an upstream node failed.
    Aborted,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeState::Pending | NodeState::Running)
    }

    /// Whether dependents may start.
    pub fn is_satisfied(self) -> bool {
        matches!(self, NodeState::Done | NodeState::Skipped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Pending => "pending",
            NodeState::Running => "running",
            NodeState::Done => "done",
            NodeState::Skipped => "skipped",
            NodeState::Failed => "failed",
            NodeState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// A node plus its per-invocation state.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node: Arc<TaskNode>,
    /// Identities of direct dependencies.
    pub deps: Vec<String>,
    pub state: NodeState,
    /// Failure message, for failed nodes.
    pub error: Option<String>,
}

impl NodeInfo {
    pub fn new(node: Arc<TaskNode>, deps: Vec<String>) -> Self {
        Self {
            node,
            deps,
            state: NodeState::Pending,
            error: None,
        }
    }
}
