// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::sync::Arc;

use crate::task::TaskNode;

/// Structured result of a single scheduler "step".
///
/// Lets tests step the graph by hand and assert on what changed.
#[derive(Debug, Clone)]
pub struct SchedulerStep {
    /// Nodes that became ready to run as a result of this step.
    pub newly_scheduled: Vec<Arc<TaskNode>>,
    /// Nodes newly aborted because an upstream node failed in this step.
    pub newly_aborted: Vec<String>,
    /// Whether every node is now in a terminal state.
    pub run_finished: bool,
}
