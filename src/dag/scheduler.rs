// src/dag/scheduler.rs

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::{RunOutlook, SchedulerStep};
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{PipelineState, TaskNode, TaskResults, TaskStatus};
use crate::progress::{total_progress, TaskWeights};
use crate::types::{RunConfig, TaskKey};

/// Outcome bookkeeping for a settled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    /// Wall time between start and settlement.
    pub duration_ms: u64,
    /// New aggregate progress, if it changed.
    pub progress: Option<u8>,
}

/// Scheduler holds the immutable DAG plus the mutable state of one run.
///
/// It is a pure, synchronous state machine: it never spawns or awaits
/// anything. It is responsible for:
/// - deciding which pending tasks are ready (all deps completed)
/// - respecting the concurrency ceiling when starting tasks
/// - marking tasks skipped, completed or failed
/// - recomputing aggregate progress after every change
///
/// The async shell (`engine::Orchestrator`) drives it and performs the
/// actual executor calls.
#[derive(Debug)]
pub struct Scheduler<K, T> {
    graph: TaskGraph<K>,
    nodes: Vec<TaskNode<K, T>>,
    weights: TaskWeights<K>,
    config: RunConfig,
    run_id: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    total_progress: u8,
}

impl<K: TaskKey, T: Clone> Scheduler<K, T> {
    pub fn new(graph: TaskGraph<K>, weights: TaskWeights<K>, config: RunConfig) -> Self {
        let nodes: Vec<TaskNode<K, T>> = graph
            .task_ids()
            .map(|id| {
                let deps = graph.dependencies_of(id).into_iter().cloned().collect();
                TaskNode::new(id.clone(), deps)
            })
            .collect();

        let total_progress = total_progress(&nodes, &weights);

        Self {
            graph,
            nodes,
            weights,
            config,
            run_id: Uuid::new_v4().to_string(),
            started_at: None,
            completed_at: None,
            total_progress,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn graph(&self) -> &TaskGraph<K> {
        &self.graph
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn total_progress(&self) -> u8 {
        self.total_progress
    }

    pub fn status_of(&self, id: &K) -> Option<TaskStatus> {
        let idx = self.graph.index_of(id)?;
        Some(self.nodes[idx].status)
    }

    pub fn running_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.status == TaskStatus::Running)
            .count()
    }

    /// Record the run start time.
    pub fn begin(&mut self) {
        self.started_at = Some(Utc::now());
        info!(
            run_id = %self.run_id,
            task_count = self.nodes.len(),
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            "scheduler: starting run"
        );
    }

    /// Record the run end time (success or abort).
    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// One readiness scan.
    ///
    /// Skips unrunnable tasks first, then starts ready tasks in declaration
    /// order until the concurrency ceiling is reached.
    pub fn step<F>(&mut self, has_executor: F) -> SchedulerStep<K>
    where
        F: Fn(&K) -> bool,
    {
        let policy = self.config.skip_policy;
        let ceiling = self.config.max_concurrent_tasks;

        let mut manager = StateManager::new(&self.graph, &mut self.nodes);
        let skipped = manager.skip_unrunnable(policy, has_executor);
        let capacity = ceiling.saturating_sub(manager.running_count());
        let started = manager.collect_new_ready_tasks(capacity);

        let progress = if skipped.is_empty() {
            None
        } else {
            self.recompute_progress()
        };

        if !started.is_empty() {
            debug!(
                run_id = %self.run_id,
                started = started.len(),
                running = self.running_count(),
                "scheduler: launching ready tasks"
            );
        }

        SchedulerStep {
            started: started.into_iter().map(|i| self.graph.id_at(i).clone()).collect(),
            skipped: skipped.into_iter().map(|i| self.graph.id_at(i).clone()).collect(),
            progress,
        }
    }

    /// Where the run stands after a step.
    pub fn outlook(&mut self) -> RunOutlook<K> {
        let manager = StateManager::new(&self.graph, &mut self.nodes);
        if manager.running_count() > 0 {
            return RunOutlook::InFlight;
        }
        if manager.all_tasks_terminal() {
            return RunOutlook::Finished;
        }
        let blocked = manager
            .blocked_tasks()
            .into_iter()
            .map(|i| self.graph.id_at(i).clone())
            .collect();
        RunOutlook::Deadlocked(blocked)
    }

    /// Results of the declared dependencies of `id`.
    pub fn dependency_results(&self, id: &K) -> TaskResults<K, T> {
        let Some(idx) = self.graph.index_of(id) else {
            return TaskResults::new();
        };
        self.graph
            .deps_at(idx)
            .iter()
            .filter_map(|&dep| {
                let node = &self.nodes[dep];
                node.result.clone().map(|r| (node.id.clone(), r))
            })
            .collect()
    }

    /// Mark a running task completed and store its result.
    pub fn complete(&mut self, id: &K, result: T) -> Option<Settled> {
        let idx = self.running_index(id, "completion")?;
        StateManager::new(&self.graph, &mut self.nodes).mark_completed(idx, result);
        let duration_ms = self.duration_ms(idx);
        debug!(run_id = %self.run_id, task = %id, duration_ms, "task completed");
        Some(Settled {
            duration_ms,
            progress: self.recompute_progress(),
        })
    }

    /// Mark a running task failed and store its error message.
    pub fn fail(&mut self, id: &K, error: String) -> Option<Settled> {
        let idx = self.running_index(id, "failure")?;
        StateManager::new(&self.graph, &mut self.nodes).mark_failed(idx, error);
        let duration_ms = self.duration_ms(idx);
        warn!(run_id = %self.run_id, task = %id, duration_ms, "task failed");
        Some(Settled {
            duration_ms,
            progress: self.recompute_progress(),
        })
    }

    /// Record an intermediate progress report for a running task.
    ///
    /// `percent` is clamped to 100. Returns the new aggregate progress if it
    /// changed; reports for unknown or non-running tasks are ignored.
    pub fn update_progress(&mut self, id: &K, percent: u8) -> Option<u8> {
        let Some(idx) = self.graph.index_of(id) else {
            warn!(task = %id, "progress for unknown task; ignoring");
            return None;
        };
        let accepted = StateManager::new(&self.graph, &mut self.nodes).set_progress(idx, percent);
        if !accepted {
            debug!(task = %id, percent, "progress for task that is not running; ignoring");
            return None;
        }
        self.recompute_progress()
    }

    /// Defensive copy of the whole run state.
    pub fn snapshot(&self) -> PipelineState<K, T> {
        PipelineState {
            run_id: self.run_id.clone(),
            tasks: self.nodes.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            total_progress: self.total_progress,
        }
    }

    /// Defensive copy of the results of completed tasks.
    pub fn results(&self) -> TaskResults<K, T> {
        self.nodes
            .iter()
            .filter(|n| n.status == TaskStatus::Completed)
            .filter_map(|n| n.result.clone().map(|r| (n.id.clone(), r)))
            .collect()
    }

    fn running_index(&self, id: &K, what: &str) -> Option<usize> {
        let Some(idx) = self.graph.index_of(id) else {
            warn!(task = %id, what, "settlement for unknown task; ignoring");
            return None;
        };
        if self.nodes[idx].status != TaskStatus::Running {
            warn!(
                task = %id,
                what,
                status = ?self.nodes[idx].status,
                "settlement for task that is not running; ignoring"
            );
            return None;
        }
        Some(idx)
    }

    fn duration_ms(&self, idx: usize) -> u64 {
        let node = &self.nodes[idx];
        match (node.started_at, node.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }

    /// Recompute aggregate progress; returns it if it changed.
    fn recompute_progress(&mut self) -> Option<u8> {
        let next = total_progress(&self.nodes, &self.weights);
        if next == self.total_progress {
            return None;
        }
        self.total_progress = next;
        Some(next)
    }
}
