// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

/// Boxed error source carried by [`PipedagError::TaskExecution`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    /// A single task's executor failed. Fatal to the whole run.
    #[error("Task '{task}' failed: {message}")]
    TaskExecution {
        task: String,
        message: String,
        #[source]
        source: BoxError,
    },

    /// Nothing is running, nothing can start, and some tasks are not terminal.
    #[error("Structural deadlock: tasks {blocked:?} can never become ready")]
    StructuralDeadlock { blocked: Vec<String> },

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipedagError {
    /// Build a `TaskExecution` error from an executor's `anyhow::Error`.
    pub fn task_execution(task: impl Into<String>, err: anyhow::Error) -> Self {
        let message = format!("{err:#}");
        Self::TaskExecution {
            task: task.into(),
            message,
            source: err.into(),
        }
    }

    /// Id of the failed task, for `TaskExecution` errors.
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            Self::TaskExecution { task, .. } => Some(task),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipedagError>;
