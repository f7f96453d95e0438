// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::model::PipelineConfig;
use crate::errors::{Result, ScandagError};
use crate::task::params::{ParamType, ParamValue};
use crate::task::registry::TaskRegistry;

/// Check a merged configuration against the registered tasks.
///
/// - reserved sections must deserialize into their typed form,
/// - sections of registered tasks may only hold declared parameters, each
///   of the declared type,
/// - sections naming no registered task are ignored,
/// - upstream references between tasks must not form a cycle.
pub fn validate_config(config: &PipelineConfig, registry: &TaskRegistry) -> Result<()> {
    validate_reserved(config)?;
    validate_task_sections(config, registry)?;
    validate_references(config, registry)?;
    Ok(())
}

fn validate_reserved(config: &PipelineConfig) -> Result<()> {
    let worker = config
        .worker()
        .map_err(|err| ScandagError::ConfigError(format!("[worker]: {err}")))?;
    if worker.dataset_concurrency == 0 {
        return Err(ScandagError::ConfigError(
            "[worker].dataset_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    config
        .scheduler()
        .map_err(|err| ScandagError::ConfigError(format!("[scheduler]: {err}")))?;
    config
        .retcode()
        .map_err(|err| ScandagError::ConfigError(format!("[retcode]: {err}")))?;
    Ok(())
}

fn validate_task_sections(config: &PipelineConfig, registry: &TaskRegistry) -> Result<()> {
    for (name, section) in config.task_sections() {
        let Some(spec) = registry.get(name) else {
            debug!(section = %name, "ignoring section of unregistered task");
            continue;
        };
        for (key, value) in section {
            let param = spec.schema.get(key).ok_or_else(|| {
                ScandagError::ConfigError(format!("[{name}] has unknown parameter '{key}'"))
            })?;
            param.parse(name, value)?;
        }
    }
    Ok(())
}

/// Upstream task names each registered task would resolve to under this
/// configuration.
fn task_references<'a>(
    config: &'a PipelineConfig,
    registry: &'a TaskRegistry,
) -> Vec<(&'a str, String)> {
    let mut edges = Vec::new();
    for spec in registry.specs() {
        let section = config.section(&spec.name);
        for param in spec.schema.specs() {
            if param.ty != ParamType::Task {
                continue;
            }
            let configured = section
                .and_then(|s| s.get(&param.name))
                .and_then(toml::Value::as_str)
                .map(str::to_string);
            let default = param
                .default
                .as_ref()
                .and_then(ParamValue::as_str)
                .map(str::to_string);
            if let Some(upstream) = configured.or(default).filter(|u| !u.is_empty()) {
                edges.push((spec.name.as_str(), upstream));
            }
        }
    }
    edges
}

fn validate_references(config: &PipelineConfig, registry: &TaskRegistry) -> Result<()> {
    let edges = task_references(config, registry);

    // Edge direction: upstream -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (task, upstream) in &edges {
        let task = *task;
        if task == upstream.as_str() {
            return Err(ScandagError::DagCycle(format!(
                "task '{task}' names itself as upstream"
            )));
        }
        graph.add_edge(upstream.as_str(), task, ());
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(ScandagError::DagCycle(format!(
            "cycle detected in upstream references involving task '{}'",
            cycle.node_id()
        ))),
    }
}
