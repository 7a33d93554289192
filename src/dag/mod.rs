// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the immutable, validated task graph and its builder.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready, respects the concurrency ceiling, and records
//!   settlements.
//! - [`task_info`] provides task status and snapshot types.
//! - [`scheduler_step`] defines the result types for scheduler steps.
//! - [`state_manager`] applies per-task state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{TaskGraph, TaskGraphBuilder};
pub use scheduler::Scheduler;
pub use scheduler_step::{RunOutlook, SchedulerStep};
pub use task_info::{PipelineState, TaskNode, TaskResults, TaskStatus};
