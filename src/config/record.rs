// src/config/record.rs

//! Backup records: the effective configuration of the last invocation,
//! stored inside the dataset.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::config::loader::parse_document;
use crate::config::model::{
    PipelineConfig, RETCODE_SECTION, RetcodeSection, SCHEDULER_SECTION, SchedulerSection,
    VERSION_SECTION, VersionSection, WORKER_SECTION, WorkerSection,
};
use crate::errors::Result;
use crate::storage::Dataset;
use crate::types::RunKind;

/// Read the record of `kind` from the dataset, if present.
pub fn read_record(dataset: &Dataset, kind: RunKind) -> Result<Option<toml::Table>> {
    match dataset.read_document(kind.record_name())? {
        Some(contents) => {
            debug!(dataset = %dataset.id(), record = kind.record_name(), "loaded backup record");
            Ok(Some(parse_document(kind.record_name(), &contents)?))
        }
        None => Ok(None),
    }
}

/// Effective configuration persisted at the end of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    pub kind: RunKind,
    /// Task sections: every configured section, with the effective
    /// parameters of resolved nodes replacing what was configured.
    pub tasks: toml::Table,
    pub worker: WorkerSection,
    pub scheduler: SchedulerSection,
    pub retcode: RetcodeSection,
    pub version: VersionSection,
}

impl BackupRecord {
    /// Assemble the record from the merged configuration and the resolved
    /// parameter sets (task name to effective parameters).
    pub fn build(
        kind: RunKind,
        config: &PipelineConfig,
        effective: &BTreeMap<String, toml::Table>,
        libraries: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut tasks: toml::Table = config
            .task_sections()
            .map(|(name, section)| (name.to_string(), toml::Value::Table(section.clone())))
            .collect();
        for (name, params) in effective {
            tasks.insert(name.clone(), toml::Value::Table(params.clone()));
        }

        Ok(Self {
            kind,
            tasks,
            worker: config.worker()?,
            scheduler: config.scheduler()?,
            retcode: config.retcode()?,
            version: libraries.clone(),
        })
    }

    pub fn to_table(&self) -> Result<toml::Table> {
        let mut table = self.tasks.clone();
        table.insert(WORKER_SECTION.into(), toml::Value::try_from(&self.worker)?);
        table.insert(SCHEDULER_SECTION.into(), toml::Value::try_from(&self.scheduler)?);
        table.insert(RETCODE_SECTION.into(), toml::Value::try_from(&self.retcode)?);
        table.insert(VERSION_SECTION.into(), toml::Value::try_from(&self.version)?);
        Ok(table)
    }

    /// Overwrite the dataset's record of this kind.
    pub fn write(&self, dataset: &Dataset) -> Result<()> {
        let rendered = toml::to_string(&self.to_table()?)?;
        dataset.write_document(self.kind.record_name(), &rendered)?;
        info!(dataset = %dataset.id(), record = self.kind.record_name(), "wrote backup record");
        Ok(())
    }
}
