// src/events/mod.rs

//! Lifecycle notifications for external observers.
//!
//! - [`EventSink`] is the observer trait: one method per event kind, all
//!   defaulting to no-ops, so a sink only implements what it cares about.
//! - [`PipelineEvent`] is the owned form of the same events, used by
//!   [`ChannelSink`] to hand them to async consumers.
//! - [`bus`] fans events out to every subscribed sink and isolates panics.

pub mod bus;
pub mod sinks;

pub use bus::EventBus;
pub use sinks::{ChannelSink, TracingSink};

use crate::dag::task_info::TaskResults;

/// Observer of a pipeline run.
///
/// Methods are called synchronously on the scheduling loop between
/// suspension points, so implementations must return promptly and must not
/// block. A panic inside a method is caught and logged; it does not abort
/// the run.
pub trait EventSink<K, T>: Send + Sync {
    fn on_run_started(&self, _run_id: &str) {}

    fn on_task_started(&self, _task: &K) {}

    fn on_task_completed(&self, _task: &K, _result: &T, _duration_ms: u64) {}

    fn on_task_failed(&self, _task: &K, _error: &str) {}

    fn on_task_skipped(&self, _task: &K) {}

    fn on_progress_changed(&self, _percent: u8) {}

    fn on_run_completed(&self, _run_id: &str, _duration_ms: u64, _results: &TaskResults<K, T>) {}

    fn on_run_failed(&self, _run_id: &str, _error: &str) {}
}

/// Owned lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent<K, T> {
    RunStarted {
        run_id: String,
    },
    TaskStarted {
        task: K,
    },
    TaskCompleted {
        task: K,
        result: T,
        duration_ms: u64,
    },
    TaskFailed {
        task: K,
        error: String,
    },
    TaskSkipped {
        task: K,
    },
    ProgressChanged {
        percent: u8,
    },
    RunCompleted {
        run_id: String,
        duration_ms: u64,
        results: TaskResults<K, T>,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
}

impl<K, T> PipelineEvent<K, T> {
    /// Invoke the matching [`EventSink`] method.
    pub fn deliver(&self, sink: &dyn EventSink<K, T>) {
        match self {
            PipelineEvent::RunStarted { run_id } => sink.on_run_started(run_id),
            PipelineEvent::TaskStarted { task } => sink.on_task_started(task),
            PipelineEvent::TaskCompleted {
                task,
                result,
                duration_ms,
            } => sink.on_task_completed(task, result, *duration_ms),
            PipelineEvent::TaskFailed { task, error } => sink.on_task_failed(task, error),
            PipelineEvent::TaskSkipped { task } => sink.on_task_skipped(task),
            PipelineEvent::ProgressChanged { percent } => sink.on_progress_changed(*percent),
            PipelineEvent::RunCompleted {
                run_id,
                duration_ms,
                results,
            } => sink.on_run_completed(run_id, *duration_ms, results),
            PipelineEvent::RunFailed { run_id, error } => sink.on_run_failed(run_id, error),
        }
    }

    /// Short kind name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "run_started",
            PipelineEvent::TaskStarted { .. } => "task_started",
            PipelineEvent::TaskCompleted { .. } => "task_completed",
            PipelineEvent::TaskFailed { .. } => "task_failed",
            PipelineEvent::TaskSkipped { .. } => "task_skipped",
            PipelineEvent::ProgressChanged { .. } => "progress_changed",
            PipelineEvent::RunCompleted { .. } => "run_completed",
            PipelineEvent::RunFailed { .. } => "run_failed",
        }
    }
}
