// src/exec/mod.rs

//! Execution layer.
//!
//! - [`executor`] defines the executor contract (`TaskExecutor`), the
//!   per-invocation `TaskContext` and the timeout wrapper.
//! - [`registry`] maps task ids to executors.
//! - [`shell`] provides `ShellExecutor`, which runs a stage as a shell
//!   command; the CLI registers one per configured task.

pub mod executor;
pub mod registry;
pub mod shell;

pub use executor::{DependencyResults, ExecFuture, ProgressReport, TaskContext, TaskExecutor, WithTimeout};
pub use registry::ExecutorRegistry;
pub use shell::ShellExecutor;
