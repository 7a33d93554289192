// src/dag/task_info.rs

//! Per-task status and the snapshot types handed out to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of a task within a run.
///
/// `Completed`, `Failed` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting on dependencies or a free concurrency slot.
    Pending,
    /// Executor has been invoked and has not settled yet.
    Running,
    Completed,
    Failed,
    /// No executor was registered (or, under the propagate policy, a
    /// dependency was skipped).
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Completed or skipped: counts fully towards progress.
    pub fn is_finished_ok(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

/// State of a single task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskNode<K, T> {
    pub id: K,
    pub status: TaskStatus,
    /// Direct dependencies in declaration order.
    pub dependencies: Vec<K>,
    /// Present once completed.
    pub result: Option<T>,
    /// Present once failed.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last reported progress, only meaningful while running.
    pub progress_percent: Option<u8>,
}

impl<K, T> TaskNode<K, T> {
    pub fn new(id: K, dependencies: Vec<K>) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            dependencies,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            progress_percent: None,
        }
    }
}

/// Snapshot of a whole run.
///
/// Always a copy: mutating it has no effect on the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState<K, T> {
    pub run_id: String,
    /// Tasks in declaration order.
    pub tasks: Vec<TaskNode<K, T>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_progress: u8,
}

impl<K: PartialEq, T> PipelineState<K, T> {
    pub fn task(&self, id: &K) -> Option<&TaskNode<K, T>> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn status_of(&self, id: &K) -> Option<TaskStatus> {
        self.task(id).map(|t| t.status)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// Results of completed tasks, keyed by task id.
pub type TaskResults<K, T> = BTreeMap<K, T>;
