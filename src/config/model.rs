// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Section names owned by the engine; every other `[Section]` belongs to a
/// task.
pub const WORKER_SECTION: &str = "worker";
pub const SCHEDULER_SECTION: &str = "scheduler";
pub const RETCODE_SECTION: &str = "retcode";
pub const VERSION_SECTION: &str = "version";

pub const RESERVED_SECTIONS: [&str; 4] = [
    WORKER_SECTION,
    SCHEDULER_SECTION,
    RETCODE_SECTION,
    VERSION_SECTION,
];

pub fn is_reserved(section: &str) -> bool {
    RESERVED_SECTIONS.contains(&section)
}

/// Merged configuration of one invocation.
///
/// Mirrors the layout of a pipeline configuration file:
///
/// ```toml
/// [worker]
/// dataset_concurrency = 1
///
/// [scheduler]
/// retry_count = 0
/// retry_delay = 1
///
/// [Undistorted]
/// upstream_task = "ImagesCollectionExists"
/// query = { channel = "rgb" }
/// ```
///
/// Task sections stay untyped here; they are converted through each task's
/// parameter schema during validation and resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    table: toml::Table,
}

impl PipelineConfig {
    pub fn new(table: toml::Table) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    pub fn into_table(self) -> toml::Table {
        self.table
    }

    /// Deep-merge `overlay` on top of this configuration.
    pub fn merge(&mut self, overlay: &toml::Table) {
        super::loader::merge_tables(&mut self.table, overlay);
    }

    pub fn section(&self, name: &str) -> Option<&toml::Table> {
        self.table.get(name).and_then(toml::Value::as_table)
    }

    /// Non-reserved sections, by name.
    pub fn task_sections(&self) -> impl Iterator<Item = (&str, &toml::Table)> {
        self.table.iter().filter_map(|(name, value)| {
            if is_reserved(name) {
                return None;
            }
            value.as_table().map(|t| (name.as_str(), t))
        })
    }

    pub fn worker(&self) -> Result<WorkerSection> {
        self.typed_section(WORKER_SECTION)
    }

    pub fn scheduler(&self) -> Result<SchedulerSection> {
        self.typed_section(SCHEDULER_SECTION)
    }

    pub fn retcode(&self) -> Result<RetcodeSection> {
        self.typed_section(RETCODE_SECTION)
    }

    fn typed_section<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        match self.section(name) {
            Some(section) => Ok(toml::Value::Table(section.clone()).try_into()?),
            None => Ok(T::default()),
        }
    }
}

/// `[worker]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    /// Datasets of one batch processed at the same time. `1` keeps the batch
    /// strictly sequential.
    #[serde(default = "default_dataset_concurrency")]
    pub dataset_concurrency: usize,
}

fn default_dataset_concurrency() -> usize {
    1
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            dataset_concurrency: default_dataset_concurrency(),
        }
    }
}

/// `[scheduler]` section: per-node retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Extra attempts after a failed one. Each failed attempt is purged.
    #[serde(default)]
    pub retry_count: u32,

    /// Seconds to wait between attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

fn default_retry_delay() -> u64 {
    1
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            retry_count: 0,
            retry_delay: default_retry_delay(),
        }
    }
}

impl SchedulerSection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

/// `[retcode]` section: process exit codes per failure class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetcodeSection {
    pub already_running: i32,
    pub missing_data: i32,
    pub not_run: i32,
    pub task_failed: i32,
    pub scheduling_error: i32,
    pub unhandled_exception: i32,
}

impl Default for RetcodeSection {
    fn default() -> Self {
        Self {
            already_running: 10,
            missing_data: 20,
            not_run: 25,
            task_failed: 30,
            scheduling_error: 35,
            unhandled_exception: 40,
        }
    }
}

/// `[version]` section: library name to version.
pub type VersionSection = BTreeMap<String, String>;
