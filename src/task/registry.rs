// src/task/registry.rs

//! Explicit task registry.
//!
//! Tasks are looked up by name in a table populated at startup. Each entry
//! carries the parameter schema used to validate configuration and a factory
//! that builds the task logic from resolved parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{Result, ScandagError};
use crate::task::params::{ParamSchema, ParamSpec, Params};
use crate::task::{TaskLogic, builtin};
use crate::types::TaskKind;

/// Builds the logic of a task from its resolved parameters.
pub type TaskFactory = Arc<dyn Fn(&Params) -> anyhow::Result<Arc<dyn TaskLogic>> + Send + Sync>;

/// Registration of one task.
#[derive(Clone)]
pub struct TaskSpec {
    pub name: String,
    pub module: String,
    pub kind: TaskKind,
    /// Data-creation task: runs against a fresh dataset and writes the
    /// source record.
    pub source: bool,
    /// Whether an invocation of this task persists its backup record.
    pub writes_record: bool,
    pub schema: ParamSchema,
    pub factory: TaskFactory,
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("writes_record", &self.writes_record)
            .field("schema", &self.schema)
            .finish()
    }
}

impl TaskSpec {
    pub fn new<F>(name: &str, module: &str, kind: TaskKind, factory: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<Arc<dyn TaskLogic>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            module: module.to_string(),
            kind,
            source: false,
            writes_record: true,
            schema: ParamSchema::new(),
            factory: Arc::new(factory),
        }
    }

    /// A producer whose logic does not depend on its parameters.
    pub fn producer(name: &str, module: &str, logic: Arc<dyn TaskLogic>) -> Self {
        Self::new(name, module, TaskKind::Producer, move |_| Ok(logic.clone()))
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.schema = self.schema.param(spec);
        self
    }

    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    /// For tasks that reset the dataset, whose record must not be rewritten.
    pub fn without_record(mut self) -> Self {
        self.writes_record = false;
        self
    }

    pub fn build(&self, params: &Params) -> Result<Arc<dyn TaskLogic>> {
        Ok((self.factory)(params)?)
    }
}

/// Name-keyed table of registered tasks plus the library versions recorded in
/// the provenance fingerprint.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    specs: BTreeMap<String, TaskSpec>,
    libraries: BTreeMap<String, String>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// An empty registry that only knows the engine's own version.
    pub fn new() -> Self {
        let mut libraries = BTreeMap::new();
        libraries.insert(
            env!("CARGO_PKG_NAME").to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self {
            specs: BTreeMap::new(),
            libraries,
        }
    }

    /// A registry holding the built-in tasks.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    /// Register (or replace) a task.
    pub fn register(&mut self, spec: TaskSpec) -> &mut Self {
        self.specs.insert(spec.name.clone(), spec);
        self
    }

    pub fn register_library(&mut self, name: &str, version: &str) -> &mut Self {
        self.libraries.insert(name.to_string(), version.to_string());
        self
    }

    pub fn libraries(&self) -> &BTreeMap<String, String> {
        &self.libraries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TaskSpec> {
        self.specs.get(name)
    }

    /// Find `name`, optionally requiring it to belong to `module`.
    pub fn lookup(&self, name: &str, module: Option<&str>) -> Result<&TaskSpec> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| ScandagError::UnregisteredTask(name.to_string()))?;

        match module {
            Some(module) if spec.module != module => Err(ScandagError::UnregisteredTask(
                format!("{name} (not in module '{module}', registered in '{}')", spec.module),
            )),
            _ => Ok(spec),
        }
    }

    pub fn specs(&self) -> impl Iterator<Item = &TaskSpec> {
        self.specs.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_the_standard_tasks() {
        let registry = TaskRegistry::builtin();
        for name in [
            "DatasetExists",
            "ImagesCollectionExists",
            "ItemExists",
            "VirtualPlantObj",
            "Clean",
            "Dummy",
        ] {
            assert!(registry.contains(name), "{name} should be registered");
        }
        assert!(registry.libraries().contains_key("scandag"));
    }

    #[test]
    fn lookup_rejects_unknown_names_and_wrong_modules() {
        let registry = TaskRegistry::builtin();
        assert!(matches!(
            registry.lookup("Reconstruct", None),
            Err(ScandagError::UnregisteredTask(_))
        ));
        assert!(matches!(
            registry.lookup("Clean", Some("segmentation")),
            Err(ScandagError::UnregisteredTask(_))
        ));
        assert!(registry.lookup("Clean", Some(builtin::MODULE)).is_ok());
    }
}
