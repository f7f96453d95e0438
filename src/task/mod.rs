// src/task/mod.rs

//! Task nodes: the units of work the scheduler executes.
//!
//! - [`params`] typed parameter schemas and resolved values.
//! - [`identity`] derives the stable node identity.
//! - [`target`] handles to output collections.
//! - [`registry`] maps task names to schemas and logic factories.
//! - [`builtin`] existence checks, cleanup and the no-op task.
//! - [`file_by_file`] per-item transform logic.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use serde_json::Value;

use crate::errors::Result;
use crate::storage::{Collection, Dataset};
use crate::types::TaskKind;

pub mod builtin;
pub mod file_by_file;
pub mod identity;
pub mod params;
pub mod registry;
pub mod target;

pub use file_by_file::FileByFile;
pub use params::{ParamSchema, ParamSpec, ParamType, ParamValue, Params};
pub use registry::{TaskRegistry, TaskSpec};
pub use target::Target;

/// Metadata key under which a producer's parameters are stamped.
pub const TASK_PARAMS_KEY: &str = "task_params";

/// The computation behind a task, opaque to the engine.
pub trait TaskLogic: Send + Sync {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()>;
}

impl<F> TaskLogic for F
where
    F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// A resolved, immutable unit of work.
#[derive(Clone)]
pub struct TaskNode {
    id: String,
    family: String,
    params: Params,
    upstream: Vec<Arc<TaskNode>>,
    kind: TaskKind,
    logic: Arc<dyn TaskLogic>,
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field(
                "upstream",
                &self.upstream.iter().map(|u| u.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TaskNode {
    pub fn new(
        family: impl Into<String>,
        params: Params,
        upstream: Vec<Arc<TaskNode>>,
        kind: TaskKind,
        logic: Arc<dyn TaskLogic>,
    ) -> Self {
        let family = family.into();
        let id = identity::node_identity(&family, &params);
        Self {
            id,
            family,
            params,
            upstream,
            kind,
            logic,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Upstream nodes, in parameter-name order.
    pub fn requires(&self) -> &[Arc<TaskNode>] {
        &self.upstream
    }

    /// Collection a dependent reads from this node inside `dataset`.
    ///
    /// Producers expose their own output. Existence checks expose the
    /// collection they assert, located through their `collection` and
    /// optional `collection_prefix` parameters. Side effects expose nothing.
    pub fn located_collection(&self, dataset: &Dataset) -> Result<Option<Collection>> {
        match self.kind {
            TaskKind::Producer => dataset.collection(&self.id),
            TaskKind::ExistenceCheck => target::find_collection(
                dataset,
                self.params.str("collection").unwrap_or_default(),
                self.params.str("collection_prefix").unwrap_or_default(),
            ),
            TaskKind::SideEffect => Ok(None),
        }
    }

    /// Output target inside `dataset`, for producers only.
    pub fn target(&self, dataset: &Dataset) -> Option<Target> {
        self.kind
            .has_target()
            .then(|| Target::new(dataset, self.id.clone()))
    }

    /// Create the output collection if absent and stamp it with the resolved
    /// parameters.
    pub fn output(&self, dataset: &Dataset) -> Result<Option<Collection>> {
        let Some(target) = self.target(dataset) else {
            return Ok(None);
        };
        let Some(collection) = target.get(true)? else {
            return Ok(None);
        };
        collection.set_metadata_key(TASK_PARAMS_KEY, self.params.to_json())?;
        Ok(Some(collection))
    }

    /// Whether the output already satisfies the completeness rule. Never
    /// true for nodes without a target, and never creates anything.
    pub fn complete(&self, dataset: &Dataset) -> Result<bool> {
        match self.target(dataset) {
            Some(target) => target.is_complete(),
            None => Ok(false),
        }
    }

    pub fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        self.logic.run(ctx)
    }
}

/// What a running task sees.
pub struct TaskContext<'a> {
    node: &'a TaskNode,
    dataset: &'a Dataset,
    output: Option<Collection>,
}

impl<'a> TaskContext<'a> {
    pub fn new(node: &'a TaskNode, dataset: &'a Dataset, output: Option<Collection>) -> Self {
        Self {
            node,
            dataset,
            output,
        }
    }

    pub fn node(&self) -> &TaskNode {
        self.node
    }

    pub fn params(&self) -> &Params {
        &self.node.params
    }

    pub fn dataset(&self) -> &Dataset {
        self.dataset
    }

    /// Collection produced (or asserted) by the `index`-th upstream node.
    pub fn input(&self, index: usize) -> anyhow::Result<Collection> {
        let upstream = self
            .node
            .upstream
            .get(index)
            .ok_or_else(|| anyhow!("task '{}' has no upstream #{index}", self.node.id))?;
        if upstream.kind() == TaskKind::SideEffect {
            bail!("upstream '{}' produces no collection", upstream.id());
        }
        match upstream.located_collection(self.dataset)? {
            Some(collection) => Ok(collection),
            None => bail!(
                "input collection of '{}' missing from dataset '{}'",
                upstream.id(),
                self.dataset.id()
            ),
        }
    }

    pub fn inputs(&self) -> anyhow::Result<Vec<Collection>> {
        (0..self.node.upstream.len()).map(|i| self.input(i)).collect()
    }

    pub fn output(&self) -> anyhow::Result<&Collection> {
        self.output
            .as_ref()
            .ok_or_else(|| anyhow!("task '{}' has no output collection", self.node.id))
    }

    /// Convenience for tasks that record extra provenance on their output.
    pub fn annotate_output(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.output()?.set_metadata_key(key, value)?;
        Ok(())
    }
}
