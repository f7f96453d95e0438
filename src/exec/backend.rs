// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of running nodes
//! itself. Production code uses [`BlockingExecutor`]; tests can plug in a
//! fake that records which nodes were dispatched.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::model::SchedulerSection;
use crate::engine::NodeOutcome;
use crate::errors::{Result, ScandagError};
use crate::storage::Dataset;
use crate::task::TaskNode;

use super::task_runner::run_node;

/// Trait abstracting how a ready node is executed.
pub trait ExecutorBackend: Send + Sync {
    /// Execute `node` against `dataset` and report its outcome.
    ///
    /// Node failures are reported as [`NodeOutcome::Failed`]; an `Err` means
    /// the backend itself broke down.
    fn execute(
        &self,
        node: Arc<TaskNode>,
        dataset: Dataset,
    ) -> Pin<Box<dyn Future<Output = Result<NodeOutcome>> + Send + '_>>;
}

/// Production backend: runs each node on the blocking thread pool, since
/// task logic does synchronous storage I/O and computation.
///
/// Failed attempts are retried according to the `[scheduler]` section; each
/// attempt starts from a purged output.
#[derive(Debug, Clone, Default)]
pub struct BlockingExecutor {
    retry: SchedulerSection,
}

impl BlockingExecutor {
    pub fn new(retry: SchedulerSection) -> Self {
        Self { retry }
    }
}

impl ExecutorBackend for BlockingExecutor {
    fn execute(
        &self,
        node: Arc<TaskNode>,
        dataset: Dataset,
    ) -> Pin<Box<dyn Future<Output = Result<NodeOutcome>> + Send + '_>> {
        Box::pin(async move {
            let attempts = self.retry.retry_count.saturating_add(1);
            let mut attempt = 1;
            loop {
                let (n, d) = (node.clone(), dataset.clone());
                let outcome = tokio::task::spawn_blocking(move || run_node(&n, &d))
                    .await
                    .map_err(|err| ScandagError::Other(err.into()))?;

                match outcome {
                    NodeOutcome::Failed(ref message) if attempt < attempts => {
                        warn!(
                            node = %node.id(),
                            attempt,
                            attempts,
                            error = %message,
                            "node attempt failed; retrying"
                        );
                        tokio::time::sleep(self.retry.retry_delay()).await;
                        attempt += 1;
                    }
                    outcome => {
                        if attempt > 1 {
                            info!(node = %node.id(), attempt, "node settled after retries");
                        }
                        return Ok(outcome);
                    }
                }
            }
        })
    }
}
