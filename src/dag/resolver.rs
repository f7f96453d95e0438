// src/dag/resolver.rs

//! Expands a requested task into its tree of upstream nodes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::config::model::PipelineConfig;
use crate::errors::{Result, ScandagError};
use crate::task::registry::TaskRegistry;
use crate::task::TaskNode;

/// Root node of a resolved graph plus the effective parameters of every task
/// that took part, keyed by task name.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub root: Arc<TaskNode>,
    pub effective: BTreeMap<String, toml::Table>,
}

/// Resolve `task` (optionally required to belong to `module`) against the
/// registry and configuration.
///
/// Task-typed parameters name upstream tasks; an empty name means "no
/// upstream". A task name that reappears while its own upstream chain is
/// being expanded is a cycle.
pub fn resolve(
    registry: &TaskRegistry,
    config: &PipelineConfig,
    task: &str,
    module: Option<&str>,
) -> Result<Resolution> {
    let mut resolver = Resolver {
        registry,
        config,
        memo: HashMap::new(),
        stack: Vec::new(),
        effective: BTreeMap::new(),
    };
    let root = resolver.resolve_task(task, module)?;
    Ok(Resolution {
        root,
        effective: resolver.effective,
    })
}

struct Resolver<'a> {
    registry: &'a TaskRegistry,
    config: &'a PipelineConfig,
    memo: HashMap<String, Arc<TaskNode>>,
    stack: Vec<String>,
    effective: BTreeMap<String, toml::Table>,
}

impl Resolver<'_> {
    fn resolve_task(&mut self, name: &str, module: Option<&str>) -> Result<Arc<TaskNode>> {
        if self.stack.iter().any(|t| t == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(ScandagError::DagCycle(chain.join(" -> ")));
        }
        if let Some(node) = self.memo.get(name) {
            return Ok(node.clone());
        }

        let registry = self.registry;
        let spec = registry.lookup(name, module)?;
        let params = spec.schema.resolve(name, self.config.section(name))?;

        self.stack.push(name.to_string());
        let mut upstream = Vec::new();
        for (param, upstream_name) in params.task_refs() {
            if upstream_name.is_empty() {
                continue;
            }
            debug!(task = %name, param = %param, upstream = %upstream_name, "resolving upstream");
            upstream.push(self.resolve_task(upstream_name, None)?);
        }
        self.stack.pop();

        let logic = spec.build(&params)?;
        self.effective.insert(name.to_string(), params.to_toml());
        let node = Arc::new(TaskNode::new(name, params, upstream, spec.kind, logic));
        debug!(task = %name, id = %node.id(), "resolved task node");

        self.memo.insert(name.to_string(), node.clone());
        Ok(node)
    }
}
