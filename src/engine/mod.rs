// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - configuration merging and validation for one dataset
//! - graph resolution and the scheduler
//! - node execution through an [`ExecutorBackend`](crate::exec::ExecutorBackend)
//! - backup records and batch processing over many datasets
//!
//! The pure scheduling state machine lives in [`crate::dag`]; the async
//! shell that feeds it is [`runtime`]. [`pipeline`] implements one
//! invocation against one dataset and [`batch`] fans it out.

use std::time::Duration;

use crate::dag::NodeState;
use crate::errors::{Result, ScandagError};
use crate::types::{RunKind, TaskKind};

pub mod batch;
pub mod pipeline;
pub mod runtime;

pub use batch::BatchReport;
pub use pipeline::{Pipeline, Plan, PlanStep, TaskRequest};
pub use runtime::Runtime;

/// Outcome of one node execution, as reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// `run()` succeeded.
    Done,
    /// Output already complete; nothing ran.
    Skipped,
    /// `run()` (or a pre-run check) failed with this message.
    Failed(String),
}

/// Final state of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub id: String,
    pub family: String,
    pub kind: TaskKind,
    pub state: NodeState,
    pub error: Option<String>,
}

/// Result of running one task graph against one dataset.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub dataset: String,
    pub task: String,
    pub kind: RunKind,
    /// Nodes in execution order.
    pub nodes: Vec<NodeReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.nodes.iter().all(|n| n.state.is_satisfied())
    }

    fn ids_in(&self, state: NodeState) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.state == state)
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Nodes whose `run()` completed in this invocation.
    pub fn executed(&self) -> Vec<&str> {
        self.ids_in(NodeState::Done)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.ids_in(NodeState::Skipped)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.ids_in(NodeState::Failed)
    }

    pub fn aborted(&self) -> Vec<&str> {
        self.ids_in(NodeState::Aborted)
    }

    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Turn node failures into an error. A failed existence check means the
    /// dataset lacks required data.
    pub fn into_result(self) -> Result<Self> {
        let Some(failed) = self.nodes.iter().find(|n| n.state == NodeState::Failed) else {
            return Ok(self);
        };
        let message = failed.error.clone().unwrap_or_default();
        if failed.kind == TaskKind::ExistenceCheck {
            Err(ScandagError::Precondition(format!(
                "{} (dataset '{}')",
                message, self.dataset
            )))
        } else {
            Err(ScandagError::TaskFailed {
                task: failed.id.clone(),
                message,
            })
        }
    }
}
