// src/progress.rs

//! Weighted aggregate progress.
//!
//! Each task contributes its full weight once completed or skipped, a
//! fraction of it while running with a reported percentage, and nothing
//! otherwise. The total is the rounded share of contributed weight.

use std::collections::HashMap;

use crate::dag::task_info::{TaskNode, TaskStatus};
use crate::errors::{PipedagError, Result};
use crate::types::TaskKey;

/// Baseline weight for tasks without an explicit entry.
pub const DEFAULT_TASK_WEIGHT: u32 = 10;

/// Static relative weights per task.
#[derive(Debug, Clone)]
pub struct TaskWeights<K> {
    weights: HashMap<K, u32>,
    default_weight: u32,
}

impl<K: TaskKey> Default for TaskWeights<K> {
    fn default() -> Self {
        Self {
            weights: HashMap::new(),
            default_weight: DEFAULT_TASK_WEIGHT,
        }
    }
}

impl<K: TaskKey> TaskWeights<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `weight` for every task without an explicit entry.
    pub fn with_default_weight(mut self, weight: u32) -> Result<Self> {
        if weight == 0 {
            return Err(PipedagError::ConfigError(
                "default task weight must be > 0".to_string(),
            ));
        }
        self.default_weight = weight;
        Ok(self)
    }

    pub fn set(&mut self, id: K, weight: u32) -> Result<()> {
        if weight == 0 {
            return Err(PipedagError::ConfigError(format!(
                "weight for task '{id}' must be > 0"
            )));
        }
        self.weights.insert(id, weight);
        Ok(())
    }

    pub fn with(mut self, id: K, weight: u32) -> Result<Self> {
        self.set(id, weight)?;
        Ok(self)
    }

    pub fn weight_of(&self, id: &K) -> u32 {
        self.weights.get(id).copied().unwrap_or(self.default_weight)
    }

    pub fn default_weight(&self) -> u32 {
        self.default_weight
    }
}

/// Compute the aggregate progress percentage for a set of tasks.
///
/// Clamped to `[0, 100]`. Rounding never reports 100 while any task is
/// still pending, running or failed; an empty set counts as done.
pub fn total_progress<K: TaskKey, T>(tasks: &[TaskNode<K, T>], weights: &TaskWeights<K>) -> u8 {
    if tasks.is_empty() {
        return 100;
    }

    let mut total_weight = 0.0_f64;
    let mut contributed = 0.0_f64;

    for task in tasks {
        let weight = f64::from(weights.weight_of(&task.id));
        total_weight += weight;
        contributed += match task.status {
            TaskStatus::Completed | TaskStatus::Skipped => weight,
            TaskStatus::Running => {
                let percent = task.progress_percent.unwrap_or(0).min(100);
                weight * f64::from(percent) / 100.0
            }
            TaskStatus::Pending | TaskStatus::Failed => 0.0,
        };
    }

    let all_done = tasks.iter().all(|t| t.status.is_finished_ok());
    if all_done {
        return 100;
    }

    let raw = (100.0 * contributed / total_weight).round().clamp(0.0, 100.0) as u8;
    raw.min(99)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &'static str, status: TaskStatus, percent: Option<u8>) -> TaskNode<&'static str, ()> {
        let mut n = TaskNode::new(id, Vec::new());
        n.status = status;
        n.progress_percent = percent;
        n
    }

    fn weights() -> TaskWeights<&'static str> {
        TaskWeights::new()
            .with("a", 40)
            .and_then(|w| w.with("b", 30))
            .and_then(|w| w.with("c", 30))
            .unwrap()
    }

    #[test]
    fn running_task_contributes_reported_fraction() {
        let tasks = vec![
            node("a", TaskStatus::Pending, None),
            node("b", TaskStatus::Pending, None),
            node("c", TaskStatus::Running, Some(50)),
        ];
        assert_eq!(total_progress(&tasks, &weights()), 15);
    }

    #[test]
    fn running_without_report_contributes_nothing() {
        let tasks = vec![
            node("a", TaskStatus::Completed, None),
            node("b", TaskStatus::Running, None),
            node("c", TaskStatus::Pending, None),
        ];
        assert_eq!(total_progress(&tasks, &weights()), 40);
    }

    #[test]
    fn skipped_counts_as_done() {
        let tasks = vec![
            node("a", TaskStatus::Completed, None),
            node("b", TaskStatus::Skipped, None),
            node("c", TaskStatus::Completed, None),
        ];
        assert_eq!(total_progress(&tasks, &weights()), 100);
    }

    #[test]
    fn never_reports_100_while_unfinished() {
        let w = TaskWeights::new().with("big", 1000).unwrap();
        let tasks = vec![
            node("big", TaskStatus::Completed, None),
            node("tiny", TaskStatus::Pending, None),
        ];
        // 1000 / 1001 would round up to 100.
        assert_eq!(total_progress(&tasks, &w.with_default_weight(1).unwrap()), 99);

        let w = TaskWeights::new().with("big", 100_000).unwrap();
        let failed = vec![
            node("big", TaskStatus::Completed, None),
            node("tiny", TaskStatus::Failed, None),
        ];
        assert_eq!(total_progress(&failed, &w.with_default_weight(1).unwrap()), 99);
    }

    #[test]
    fn unknown_ids_use_default_weight_and_zero_is_rejected() {
        let w: TaskWeights<&str> = TaskWeights::new();
        assert_eq!(w.weight_of(&"anything"), DEFAULT_TASK_WEIGHT);
        assert!(TaskWeights::<&str>::new().with("x", 0).is_err());
        assert!(TaskWeights::<&str>::new().with_default_weight(0).is_err());
    }

    #[test]
    fn empty_graph_is_complete() {
        let tasks: Vec<TaskNode<&str, ()>> = Vec::new();
        assert_eq!(total_progress(&tasks, &TaskWeights::new()), 100);
    }
}
