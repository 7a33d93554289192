// src/events/sinks.rs

use std::fmt::Display;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{EventSink, PipelineEvent};
use crate::dag::task_info::TaskResults;

/// Forwards every event over an unbounded channel.
///
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink<K, T> {
    tx: mpsc::UnboundedSender<PipelineEvent<K, T>>,
}

impl<K, T> ChannelSink<K, T> {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent<K, T>>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent<K, T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn forward(&self, event: PipelineEvent<K, T>) {
        let _ = self.tx.send(event);
    }
}

impl<K, T> EventSink<K, T> for ChannelSink<K, T>
where
    K: Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    fn on_run_started(&self, run_id: &str) {
        self.forward(PipelineEvent::RunStarted {
            run_id: run_id.to_string(),
        });
    }

    fn on_task_started(&self, task: &K) {
        self.forward(PipelineEvent::TaskStarted { task: task.clone() });
    }

    fn on_task_completed(&self, task: &K, result: &T, duration_ms: u64) {
        self.forward(PipelineEvent::TaskCompleted {
            task: task.clone(),
            result: result.clone(),
            duration_ms,
        });
    }

    fn on_task_failed(&self, task: &K, error: &str) {
        self.forward(PipelineEvent::TaskFailed {
            task: task.clone(),
            error: error.to_string(),
        });
    }

    fn on_task_skipped(&self, task: &K) {
        self.forward(PipelineEvent::TaskSkipped { task: task.clone() });
    }

    fn on_progress_changed(&self, percent: u8) {
        self.forward(PipelineEvent::ProgressChanged { percent });
    }

    fn on_run_completed(&self, run_id: &str, duration_ms: u64, results: &TaskResults<K, T>) {
        self.forward(PipelineEvent::RunCompleted {
            run_id: run_id.to_string(),
            duration_ms,
            results: results.clone(),
        });
    }

    fn on_run_failed(&self, run_id: &str, error: &str) {
        self.forward(PipelineEvent::RunFailed {
            run_id: run_id.to_string(),
            error: error.to_string(),
        });
    }
}

/// Logs every event through `tracing`. Results are not logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl<K: Display, T> EventSink<K, T> for TracingSink {
    fn on_run_started(&self, run_id: &str) {
        info!(run_id, "run started");
    }

    fn on_task_started(&self, task: &K) {
        info!(task = %task, "task started");
    }

    fn on_task_completed(&self, task: &K, _result: &T, duration_ms: u64) {
        info!(task = %task, duration_ms, "task completed");
    }

    fn on_task_failed(&self, task: &K, error: &str) {
        warn!(task = %task, error, "task failed");
    }

    fn on_task_skipped(&self, task: &K) {
        info!(task = %task, "task skipped");
    }

    fn on_progress_changed(&self, percent: u8) {
        info!(percent, "progress");
    }

    fn on_run_completed(&self, run_id: &str, duration_ms: u64, results: &TaskResults<K, T>) {
        info!(run_id, duration_ms, completed = results.len(), "run completed");
    }

    fn on_run_failed(&self, run_id: &str, error: &str) {
        warn!(run_id, error, "run failed");
    }
}
