// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dag::Scheduler;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::storage::Dataset;
use crate::types::RunKind;

use super::{NodeOutcome, NodeReport, RunReport};

/// Drives the scheduler for one dataset and delegates node execution to an
/// `ExecutorBackend`.
///
/// This is a thin async shell around [`Scheduler`], which holds all the
/// scheduling semantics. Ready nodes are executed one at a time in the order
/// the scheduler releases them, so node execution within a dataset is
/// serialized along the dependency order.
pub struct Runtime<E: ExecutorBackend> {
    scheduler: Scheduler,
    executor: E,
    dataset: Dataset,
    kind: RunKind,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("dataset", &self.dataset.id())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(scheduler: Scheduler, executor: E, dataset: Dataset, kind: RunKind) -> Self {
        Self {
            scheduler,
            executor,
            dataset,
            kind,
        }
    }

    /// Run the graph to completion and report every node's final state.
    pub async fn run(mut self) -> Result<RunReport> {
        let started = Instant::now();
        let root = self.scheduler.graph().root().to_string();
        info!(dataset = %self.dataset.id(), root = %root, "runtime started");

        let mut ready: VecDeque<_> = self.scheduler.start_run().into();

        while let Some(node) = ready.pop_front() {
            debug!(node = %node.id(), "dispatching node");
            let outcome = match self.executor.execute(node.clone(), self.dataset.clone()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(node = %node.id(), error = %err, "executor error");
                    NodeOutcome::Failed(err.to_string())
                }
            };

            let step = self.scheduler.step_completion(node.id(), outcome);
            if !step.newly_aborted.is_empty() {
                debug!(aborted = ?step.newly_aborted, "dependents aborted");
            }
            ready.extend(step.newly_scheduled);
        }

        let graph = self.scheduler.graph();
        let nodes: Vec<NodeReport> = graph
            .nodes()
            .map(|node| NodeReport {
                id: node.id().to_string(),
                family: node.family().to_string(),
                kind: node.kind(),
                state: self
                    .scheduler
                    .state_of(node.id())
                    .unwrap_or(crate::dag::NodeState::Pending),
                error: self.scheduler.error_of(node.id()).map(str::to_string),
            })
            .collect();

        let report = RunReport {
            dataset: self.dataset.id().to_string(),
            task: graph
                .node(&root)
                .map(|n| n.family().to_string())
                .unwrap_or(root),
            kind: self.kind,
            nodes,
            elapsed: started.elapsed(),
        };
        info!(
            dataset = %report.dataset,
            executed = report.executed().len(),
            skipped = report.skipped().len(),
            failed = report.failed().len(),
            aborted = report.aborted().len(),
            elapsed = ?report.elapsed,
            "runtime exiting"
        );
        Ok(report)
    }
}
