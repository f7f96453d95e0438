use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use scandag::engine::NodeOutcome;
use scandag::errors::Result;
use scandag::exec::ExecutorBackend;
use scandag::storage::Dataset;
use scandag::task::TaskNode;

/// A fake executor that:
/// - records the id of every dispatched node
/// - never calls the node's logic or touches the dataset
/// - reports `Done`, or `Failed` for the families marked as failing.
pub struct FakeExecutor {
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            executed,
            failing: HashSet::new(),
        }
    }

    /// Report every node of `family` as failed.
    pub fn failing(mut self, family: &str) -> Self {
        self.failing.insert(family.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn execute(
        &self,
        node: Arc<TaskNode>,
        _dataset: Dataset,
    ) -> Pin<Box<dyn Future<Output = Result<NodeOutcome>> + Send + '_>> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(node.id().to_string());

            if self.failing.contains(node.family()) {
                Ok(NodeOutcome::Failed(format!("{} failed in fake executor", node.id())))
            } else {
                Ok(NodeOutcome::Done)
            }
        })
    }
}
