// crates/test-utils/src/sinks.rs

use std::sync::{Arc, Mutex};

use pipedag::dag::TaskResults;
use pipedag::events::{EventSink, PipelineEvent};

/// Records every event it receives, in order.
#[derive(Debug, Clone)]
pub struct RecordingSink<K, T> {
    events: Arc<Mutex<Vec<PipelineEvent<K, T>>>>,
}

impl<K, T> Default for RecordingSink<K, T> {
    fn default() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<K: Clone, T: Clone> RecordingSink<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent<K, T>> {
        self.events.lock().unwrap().clone()
    }

    /// `kind()` of every recorded event, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    /// Percentages of every progress-changed event, in order.
    pub fn progress_values(&self) -> Vec<u8> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::ProgressChanged { percent } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PipelineEvent<K, T>) {
        self.events.lock().unwrap().push(event);
    }
}

impl<K, T> EventSink<K, T> for RecordingSink<K, T>
where
    K: Clone + Send + Sync,
    T: Clone + Send + Sync,
{
    fn on_run_started(&self, run_id: &str) {
        self.push(PipelineEvent::RunStarted {
            run_id: run_id.to_string(),
        });
    }

    fn on_task_started(&self, task: &K) {
        self.push(PipelineEvent::TaskStarted { task: task.clone() });
    }

    fn on_task_completed(&self, task: &K, result: &T, duration_ms: u64) {
        self.push(PipelineEvent::TaskCompleted {
            task: task.clone(),
            result: result.clone(),
            duration_ms,
        });
    }

    fn on_task_failed(&self, task: &K, error: &str) {
        self.push(PipelineEvent::TaskFailed {
            task: task.clone(),
            error: error.to_string(),
        });
    }

    fn on_task_skipped(&self, task: &K) {
        self.push(PipelineEvent::TaskSkipped { task: task.clone() });
    }

    fn on_progress_changed(&self, percent: u8) {
        self.push(PipelineEvent::ProgressChanged { percent });
    }

    fn on_run_completed(&self, run_id: &str, duration_ms: u64, results: &TaskResults<K, T>) {
        self.push(PipelineEvent::RunCompleted {
            run_id: run_id.to_string(),
            duration_ms,
            results: results.clone(),
        });
    }

    fn on_run_failed(&self, run_id: &str, error: &str) {
        self.push(PipelineEvent::RunFailed {
            run_id: run_id.to_string(),
            error: error.to_string(),
        });
    }
}

/// Panics on every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingSink;

impl<K, T> EventSink<K, T> for PanickingSink {
    fn on_run_started(&self, _run_id: &str) {
        panic!("sink exploded on run-started");
    }

    fn on_task_started(&self, _task: &K) {
        panic!("sink exploded on task-started");
    }

    fn on_task_completed(&self, _task: &K, _result: &T, _duration_ms: u64) {
        panic!("sink exploded on task-completed");
    }

    fn on_progress_changed(&self, _percent: u8) {
        panic!("sink exploded on progress-changed");
    }
}
