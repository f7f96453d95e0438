// src/errors.rs

//! Crate-wide error type, result alias and exit-code mapping.

use thiserror::Error;

use crate::config::model::RetcodeSection;

#[derive(Error, Debug)]
pub enum ScandagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unregistered task: {0}")]
    UnregisteredTask(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage busy: {0}")]
    StorageBusy(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScandagError {
    /// Whether the storage layer reported itself transiently locked.
    ///
    /// Errors wrapped in `Other` are inspected too, since task logic reports
    /// storage failures through `anyhow`.
    pub fn is_busy(&self) -> bool {
        match self {
            ScandagError::StorageBusy(_) => true,
            ScandagError::Other(err) => matches!(
                err.downcast_ref::<ScandagError>(),
                Some(ScandagError::StorageBusy(_))
            ),
            _ => false,
        }
    }

    /// Process exit code for this error, following the `[retcode]` table.
    pub fn retcode(&self, codes: &RetcodeSection) -> i32 {
        match self {
            ScandagError::StorageBusy(_) => codes.already_running,
            ScandagError::Precondition(_) => codes.missing_data,
            ScandagError::TaskFailed { .. } => codes.task_failed,
            ScandagError::ConfigError(_)
            | ScandagError::UnregisteredTask(_)
            | ScandagError::DagCycle(_)
            | ScandagError::TomlError(_) => codes.scheduling_error,
            _ if self.is_busy() => codes.already_running,
            _ => codes.unhandled_exception,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ScandagError>;
