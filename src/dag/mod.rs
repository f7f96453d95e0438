// src/dag/mod.rs

//! Graph resolution and scheduling.
//!
//! - [`resolver`] expands a requested task into upstream nodes.
//! - [`graph`] de-duplicates nodes and orders them dependencies first.
//! - [`scheduler`] contains the per-invocation state machine that decides
//!   which nodes are ready to run and aborts dependents of failed nodes.
//! - [`task_info`] provides node states.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages state transitions.

pub mod graph;
pub mod resolver;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::TaskGraph;
pub use resolver::{Resolution, resolve};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::NodeState;
