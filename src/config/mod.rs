// src/config/mod.rs

//! Configuration loading, merging and validation.
//!
//! Responsibilities:
//! - Define the reserved sections and the merged configuration (`model.rs`).
//! - Load configuration files, directories and local overrides (`loader.rs`).
//! - Read and write the per-dataset backup records (`record.rs`).
//! - Validate configuration against the task registry (`validate.rs`).

pub mod loader;
pub mod model;
pub mod record;
pub mod validate;

pub use loader::{load_from_path, local_overrides, merge_tables};
pub use model::{PipelineConfig, RetcodeSection, SchedulerSection, WorkerSection};
pub use record::{BackupRecord, read_record};
pub use validate::validate_config;
