// src/exec/mod.rs

//! Node execution.
//!
//! - [`backend`] defines the executor abstraction and the production
//!   blocking-pool backend.
//! - [`task_runner`] runs one node attempt: completion check, dependency
//!   check, output creation, run, purge on failure.

pub mod backend;
pub mod task_runner;

pub use backend::{BlockingExecutor, ExecutorBackend};
pub use task_runner::run_node;
