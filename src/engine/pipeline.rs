// src/engine/pipeline.rs

//! One invocation: a task graph run against one dataset.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::PipelineConfig;
use crate::config::{BackupRecord, local_overrides, read_record, validate_config};
use crate::dag::{Resolution, Scheduler, TaskGraph, resolve};
use crate::errors::{Result, ScandagError};
use crate::exec::BlockingExecutor;
use crate::storage::{Dataset, Session, Storage};
use crate::task::registry::{TaskRegistry, TaskSpec};
use crate::types::{PIPELINE_RECORD, RunKind, SOURCE_RECORD, TaskKind};

use super::{RunReport, Runtime};

/// What to run: a registered task, the module it must belong to, and the
/// explicit configuration supplied for this invocation.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    pub task: String,
    pub module: Option<String>,
    pub config: toml::Table,
}

impl TaskRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_config(mut self, config: toml::Table) -> Self {
        self.config = config;
        self
    }

    fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }
}

/// One step of a dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub id: String,
    pub kind: TaskKind,
    /// Output already complete: the step would be skipped.
    pub complete: bool,
}

/// Execution plan of a dry run, in execution order.
#[derive(Debug, Clone)]
pub struct Plan {
    pub dataset: String,
    pub task: String,
    pub kind: RunKind,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Steps that would invoke `run()`.
    pub fn to_run(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.complete)
            .map(|s| s.id.as_str())
            .collect()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan for '{}' on dataset '{}' ({} run):", self.task, self.dataset, self.kind)?;
        for (i, step) in self.steps.iter().enumerate() {
            let action = if step.complete { "skip (complete)" } else { "run" };
            writeln!(f, "  {:>2}. {} [{}] {}", i + 1, step.id, step.kind, action)?;
        }
        Ok(())
    }
}

/// The engine entry point: a task registry bound to one store.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<TaskRegistry>,
    storage: Arc<dyn Storage>,
}

/// Everything an invocation decided before touching the dataset.
struct Prepared {
    session: Session,
    dataset: Option<Dataset>,
    kind: RunKind,
    config: PipelineConfig,
    resolution: Resolution,
    graph: TaskGraph,
}

impl Pipeline {
    pub fn new(registry: TaskRegistry, storage: Arc<dyn Storage>) -> Self {
        Self {
            registry: Arc::new(registry),
            storage,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Run `request` against `dataset`.
    ///
    /// Configuration and precondition problems are returned as errors before
    /// any node runs. Node failures are not errors here: they are part of
    /// the returned report (see [`RunReport::into_result`]). The backup
    /// record is written whenever the graph ran.
    pub async fn execute_task(&self, request: &TaskRequest, dataset: &str) -> Result<RunReport> {
        let spec = self.registry.lookup(&request.task, request.module())?;
        let prepared = self.prepare(spec, request, dataset, false)?;

        let dataset = match prepared.dataset {
            Some(dataset) => dataset,
            None => {
                info!(dataset = %dataset, "creating dataset for source task");
                prepared.session.create_dataset(dataset)?
            }
        };

        let executor = BlockingExecutor::new(prepared.config.scheduler()?);
        let scheduler = Scheduler::new(prepared.graph);
        let report = Runtime::new(scheduler, executor, dataset.clone(), prepared.kind)
            .run()
            .await?;

        if spec.writes_record {
            BackupRecord::build(
                prepared.kind,
                &prepared.config,
                &prepared.resolution.effective,
                self.registry.libraries(),
            )?
            .write(&dataset)?;
        } else {
            debug!(task = %spec.name, "task does not persist a backup record");
        }

        Ok(report)
    }

    /// Resolve `request` against `dataset` and report what would run,
    /// without writing or deleting anything.
    pub fn plan(&self, request: &TaskRequest, dataset: &str) -> Result<Plan> {
        let spec = self.registry.lookup(&request.task, request.module())?;
        let prepared = self.prepare(spec, request, dataset, true)?;

        let mut steps = Vec::new();
        for node in prepared.graph.nodes() {
            let complete = match &prepared.dataset {
                Some(dataset) => node.complete(dataset)?,
                None => false,
            };
            steps.push(PlanStep {
                id: node.id().to_string(),
                kind: node.kind(),
                complete,
            });
        }

        Ok(Plan {
            dataset: dataset.to_string(),
            task: request.task.clone(),
            kind: prepared.kind,
            steps,
        })
    }

    /// Open the session, check dataset preconditions, merge and validate
    /// configuration, and resolve the graph. Never writes; a `read_only`
    /// session does not even take the store lock.
    fn prepare(
        &self,
        spec: &TaskSpec,
        request: &TaskRequest,
        id: &str,
        read_only: bool,
    ) -> Result<Prepared> {
        let kind = if spec.source {
            RunKind::Source
        } else {
            RunKind::Pipeline
        };

        let session = if read_only {
            Session::open_read_only(self.storage.clone())?
        } else {
            Session::open(self.storage.clone())?
        };
        let dataset = session.dataset(id)?;

        match (kind, &dataset) {
            (RunKind::Pipeline, None) => {
                return Err(ScandagError::Precondition(format!(
                    "dataset '{id}' does not exist"
                )));
            }
            (RunKind::Source, Some(existing)) => {
                if existing.read_document(PIPELINE_RECORD)?.is_some() {
                    return Err(ScandagError::Precondition(format!(
                        "source task '{}' requested on dataset '{id}', which holds a \
                         '{PIPELINE_RECORD}' record; clean it or use another dataset",
                        spec.name
                    )));
                }
                populated_guard(existing, &spec.name)?;
            }
            _ => {}
        }

        let config = merged_config(dataset.as_ref(), kind, &request.config)?;
        validate_config(&config, &self.registry)?;

        let resolution = resolve(&self.registry, &config, &spec.name, request.module())?;
        let graph = TaskGraph::from_root(&resolution.root)?;
        info!(
            dataset = %id,
            task = %spec.name,
            kind = %kind,
            nodes = graph.len(),
            "resolved task graph"
        );

        Ok(Prepared {
            session,
            dataset,
            kind,
            config,
            resolution,
            graph,
        })
    }
}

/// A source task only writes into an empty dataset. Its own previous record
/// is the one thing allowed to be there already.
fn populated_guard(dataset: &Dataset, task: &str) -> Result<()> {
    let collections: Vec<String> = dataset
        .collections()?
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let documents: Vec<String> = dataset
        .documents()?
        .into_iter()
        .filter(|name| name != SOURCE_RECORD)
        .collect();
    if collections.is_empty() && documents.is_empty() {
        return Ok(());
    }
    Err(ScandagError::Precondition(format!(
        "source task '{task}' requested on dataset '{}', which is not empty \
         (collections: {collections:?}, documents: {documents:?})",
        dataset.id()
    )))
}

/// Merge configuration layers, lowest precedence first: the dataset's
/// backup record of this run kind, the explicit configuration, then local
/// override documents stored with the dataset. Task defaults sit below all
/// of them and are applied during resolution.
fn merged_config(
    dataset: Option<&Dataset>,
    kind: RunKind,
    explicit: &toml::Table,
) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();

    if let Some(dataset) = dataset {
        if let Some(record) = read_record(dataset, kind)? {
            info!(dataset = %dataset.id(), record = kind.record_name(), "using previous configuration as base");
            config.merge(&record);
        }
    }

    config.merge(explicit);

    if let Some(dataset) = dataset {
        config.merge(&local_overrides(dataset)?);
    }

    Ok(config)
}
