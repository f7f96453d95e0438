// src/exec/task_runner.rs

//! Runs a single node against a dataset.

use anyhow::bail;
use tracing::{debug, error, info, warn};

use crate::engine::NodeOutcome;
use crate::storage::Dataset;
use crate::task::{TaskContext, TaskNode};
use crate::types::TaskKind;

/// Execute one attempt of `node`.
///
/// - an already complete output is skipped without calling `run()`;
/// - upstream producers must be complete, otherwise the dependency is
///   unfulfilled and the node fails;
/// - the output is created and stamped before `run()`;
/// - on any failure the node's output is purged before returning.
pub fn run_node(node: &TaskNode, dataset: &Dataset) -> NodeOutcome {
    match run_node_inner(node, dataset) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(node = %node.id(), dataset = %dataset.id(), error = %format!("{err:#}"), "node failed");
            purge_output(node, dataset);
            NodeOutcome::Failed(format!("{err:#}"))
        }
    }
}

fn run_node_inner(node: &TaskNode, dataset: &Dataset) -> anyhow::Result<NodeOutcome> {
    if node.complete(dataset)? {
        info!(node = %node.id(), "output already complete; skipping");
        return Ok(NodeOutcome::Skipped);
    }

    for upstream in node.requires() {
        if upstream.kind() == TaskKind::Producer && !upstream.complete(dataset)? {
            bail!(
                "unfulfilled dependency: '{}' has no complete output in dataset '{}'",
                upstream.id(),
                dataset.id()
            );
        }
    }

    let output = node.output(dataset)?;
    let ctx = TaskContext::new(node, dataset, output);

    info!(node = %node.id(), kind = %node.kind(), "running node");
    node.run(&ctx)?;
    debug!(node = %node.id(), "node run finished");
    Ok(NodeOutcome::Done)
}

fn purge_output(node: &TaskNode, dataset: &Dataset) {
    let Some(target) = node.target(dataset) else {
        return;
    };
    match target.purge() {
        Ok(true) => info!(node = %node.id(), "removed output of failed node"),
        Ok(false) => {}
        Err(err) => warn!(node = %node.id(), error = %err, "failed to remove output of failed node"),
    }
}
