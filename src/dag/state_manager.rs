// src/dag/state_manager.rs

//! Per-run status transitions and readiness checks.

use chrono::Utc;
use tracing::debug;

use crate::dag::graph::TaskGraph;
use crate::dag::task_info::{TaskNode, TaskStatus};
use crate::types::{SkipPolicy, TaskKey};

/// Whether a pending task may start, judged from its dependencies only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every dependency is completed.
    Ready,
    /// Some dependency is still pending or running.
    Waiting,
    /// Some dependency was skipped and none has failed.
    BlockedBySkip,
    /// Some dependency failed.
    BlockedByFailure,
}

/// Applies state transitions to the task nodes of one run.
///
/// Nodes are indexed the same way as the [`TaskGraph`] they were built from.
pub struct StateManager<'a, K, T> {
    graph: &'a TaskGraph<K>,
    nodes: &'a mut [TaskNode<K, T>],
}

impl<'a, K: TaskKey, T> StateManager<'a, K, T> {
    pub fn new(graph: &'a TaskGraph<K>, nodes: &'a mut [TaskNode<K, T>]) -> Self {
        Self { graph, nodes }
    }

    /// Readiness of the node at `idx`.
    ///
    /// This is the canonical dependency-satisfaction rule: only `Completed`
    /// dependencies count.
    pub fn readiness(&self, idx: usize) -> Readiness {
        readiness_of(self.graph, self.nodes, idx)
    }

    pub fn running_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.status == TaskStatus::Running)
            .count()
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.nodes.iter().all(|n| n.status.is_terminal())
    }

    /// Mark every pending task that can never run as `Skipped`.
    ///
    /// A pending task is skipped when it is ready but has no executor, or,
    /// under [`SkipPolicy::Propagate`], when any dependency was skipped.
    /// Repeats until no further task changes so that skips propagate
    /// transitively regardless of declaration order.
    pub fn skip_unrunnable<F>(&mut self, policy: SkipPolicy, has_executor: F) -> Vec<usize>
    where
        F: Fn(&K) -> bool,
    {
        let mut skipped = Vec::new();

        loop {
            let mut changed = false;

            for idx in 0..self.nodes.len() {
                if self.nodes[idx].status != TaskStatus::Pending {
                    continue;
                }

                let reason = match self.readiness(idx) {
                    Readiness::Ready if !has_executor(&self.nodes[idx].id) => "no executor registered",
                    Readiness::BlockedBySkip if policy == SkipPolicy::Propagate => {
                        "dependency was skipped"
                    }
                    _ => continue,
                };

                debug!(task = %self.nodes[idx].id, reason, "marking task Skipped");
                let node = &mut self.nodes[idx];
                node.status = TaskStatus::Skipped;
                node.completed_at = Some(Utc::now());
                skipped.push(idx);
                changed = true;
            }

            if !changed {
                break;
            }
        }

        skipped
    }

    /// Collect up to `capacity` ready tasks in declaration order and mark
    /// them `Running`.
    ///
    /// Callers must have run [`skip_unrunnable`](Self::skip_unrunnable)
    /// first so that every ready task here has an executor.
    pub fn collect_new_ready_tasks(&mut self, capacity: usize) -> Vec<usize> {
        let mut ready = Vec::new();
        if capacity == 0 {
            return ready;
        }

        // Decide first, then mutate.
        let candidates: Vec<usize> = (0..self.nodes.len())
            .filter(|&idx| {
                self.nodes[idx].status == TaskStatus::Pending
                    && self.readiness(idx) == Readiness::Ready
            })
            .take(capacity)
            .collect();

        for idx in candidates {
            let node = &mut self.nodes[idx];
            debug!(task = %node.id, "dependencies satisfied; marking Running");
            node.status = TaskStatus::Running;
            node.started_at = Some(Utc::now());
            node.progress_percent = None;
            ready.push(idx);
        }

        ready
    }

    pub fn mark_completed(&mut self, idx: usize, result: T) {
        let node = &mut self.nodes[idx];
        node.status = TaskStatus::Completed;
        node.result = Some(result);
        node.completed_at = Some(Utc::now());
        node.progress_percent = None;
    }

    pub fn mark_failed(&mut self, idx: usize, error: String) {
        let node = &mut self.nodes[idx];
        node.status = TaskStatus::Failed;
        node.error = Some(error);
        node.completed_at = Some(Utc::now());
        node.progress_percent = None;
    }

    /// Record a progress report; returns `false` if the task is not running.
    pub fn set_progress(&mut self, idx: usize, percent: u8) -> bool {
        let node = &mut self.nodes[idx];
        if node.status != TaskStatus::Running {
            return false;
        }
        node.progress_percent = Some(percent.min(100));
        true
    }

    /// Pending tasks that can never start: used to describe a deadlock.
    pub fn blocked_tasks(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&idx| self.nodes[idx].status == TaskStatus::Pending)
            .collect()
    }
}

/// Shared-reference variant of [`StateManager::readiness`].
pub fn readiness_of<K: TaskKey, T>(
    graph: &TaskGraph<K>,
    nodes: &[TaskNode<K, T>],
    idx: usize,
) -> Readiness {
    let mut waiting = false;
    let mut skipped = false;

    for &dep in graph.deps_at(idx) {
        match nodes[dep].status {
            TaskStatus::Completed => {}
            TaskStatus::Failed => return Readiness::BlockedByFailure,
            TaskStatus::Skipped => skipped = true,
            TaskStatus::Pending | TaskStatus::Running => waiting = true,
        }
    }

    if skipped {
        Readiness::BlockedBySkip
    } else if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}
