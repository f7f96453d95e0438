use std::fmt;

/// Name of the backup record written for source (data-creation) runs.
pub const SOURCE_RECORD: &str = "source.toml";

/// Name of the backup record written for every other run.
pub const PIPELINE_RECORD: &str = "pipeline.toml";

/// Which backup record an invocation reads and writes.
///
/// - `Source`: the requested task creates data in an empty/fresh dataset.
/// - `Pipeline`: the requested task processes a dataset populated earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Source,
    Pipeline,
}

impl RunKind {
    /// File name of the backup record for this kind of run.
    pub fn record_name(self) -> &'static str {
        match self {
            RunKind::Source => SOURCE_RECORD,
            RunKind::Pipeline => PIPELINE_RECORD,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Source => f.write_str("source"),
            RunKind::Pipeline => f.write_str("pipeline"),
        }
    }
}

/// What a task node produces, which decides how completion is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Writes a collection named after the node identity. Complete once that
    /// collection holds at least one item.
    Producer,
    /// Asserts that a dataset, collection or item already exists. Never
    /// complete, carries no target, always re-executes.
    ExistenceCheck,
    /// Performs an operation on the dataset (e.g. cleanup). Never complete,
    /// carries no target, always re-executes.
    SideEffect,
}

impl TaskKind {
    pub fn has_target(self) -> bool {
        matches!(self, TaskKind::Producer)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Producer => "producer",
            TaskKind::ExistenceCheck => "existence-check",
            TaskKind::SideEffect => "side-effect",
        };
        f.write_str(s)
    }
}
