// crates/test-utils/src/fake_executor.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use pipedag::exec::{DependencyResults, ExecFuture, TaskContext, TaskExecutor};
use pipedag::types::TaskKey;

#[derive(Debug, Default)]
struct ProbeState {
    running: usize,
    max_running: usize,
    started: Vec<String>,
    finished: Vec<String>,
    cancelled: Vec<String>,
    inputs: HashMap<String, Vec<String>>,
}

/// Shared record of what fake executors did:
/// - start and finish order
/// - peak number of simultaneously running executors
/// - which dependency results each task received
/// - which tasks observed cancellation
#[derive(Debug, Clone, Default)]
pub struct ExecutionProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl ExecutionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().unwrap().max_running
    }

    pub fn running(&self) -> usize {
        self.state.lock().unwrap().running
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.state.lock().unwrap().finished.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// Dependency ids (sorted) handed to `task`'s executor.
    pub fn inputs_of(&self, task: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .inputs
            .get(task)
            .cloned()
            .unwrap_or_default()
    }

    fn enter(&self, task: &str, inputs: Vec<String>) -> RunningGuard {
        let mut state = self.state.lock().unwrap();
        state.running += 1;
        state.max_running = state.max_running.max(state.running);
        state.started.push(task.to_string());
        state.inputs.insert(task.to_string(), inputs);
        RunningGuard {
            probe: self.clone(),
        }
    }

    fn finish(&self, task: &str) {
        self.state.lock().unwrap().finished.push(task.to_string());
    }

    fn mark_cancelled(&self, task: &str) {
        self.state.lock().unwrap().cancelled.push(task.to_string());
    }
}

/// Decrements the running count even if the executor future is dropped.
struct RunningGuard {
    probe: ExecutionProbe,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.probe.state.lock() {
            state.running -= 1;
        }
    }
}

#[derive(Debug, Clone)]
pub enum Behaviour<T> {
    Succeed(T),
    Fail(String),
    Panic(String),
    /// Wait until the run is cancelled, then fail.
    WaitForCancel,
}

/// A fake executor that:
/// - records itself in an [`ExecutionProbe`]
/// - optionally reports progress steps and sleeps
/// - then succeeds, fails, panics, or waits for cancellation.
#[derive(Debug, Clone)]
pub struct ScriptedExecutor<T> {
    behaviour: Behaviour<T>,
    delay: Duration,
    progress: Vec<u8>,
    probe: ExecutionProbe,
}

impl<T> ScriptedExecutor<T> {
    fn with_behaviour(behaviour: Behaviour<T>, probe: &ExecutionProbe) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            progress: Vec::new(),
            probe: probe.clone(),
        }
    }

    pub fn succeed(value: T, probe: &ExecutionProbe) -> Self {
        Self::with_behaviour(Behaviour::Succeed(value), probe)
    }

    pub fn fail(message: &str, probe: &ExecutionProbe) -> Self {
        Self::with_behaviour(Behaviour::Fail(message.to_string()), probe)
    }

    pub fn panic(message: &str, probe: &ExecutionProbe) -> Self {
        Self::with_behaviour(Behaviour::Panic(message.to_string()), probe)
    }

    pub fn wait_for_cancel(probe: &ExecutionProbe) -> Self {
        Self::with_behaviour(Behaviour::WaitForCancel, probe)
    }

    /// Sleep this long before settling.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report these percentages, in order, before the delay.
    pub fn with_progress(mut self, steps: &[u8]) -> Self {
        self.progress = steps.to_vec();
        self
    }
}

impl<K, T> TaskExecutor<K, T> for ScriptedExecutor<T>
where
    K: TaskKey,
    T: Clone + Send + Sync + 'static,
{
    fn execute(&self, inputs: DependencyResults<K, T>, ctx: TaskContext<K>) -> ExecFuture<T> {
        let this = self.clone();
        Box::pin(async move {
            let task = ctx.task_id().to_string();
            let _guard = this
                .probe
                .enter(&task, inputs.keys().map(|k| k.to_string()).collect());

            for percent in this.progress.iter() {
                ctx.report_progress(*percent);
                tokio::task::yield_now().await;
            }
            if !this.delay.is_zero() {
                tokio::time::sleep(this.delay).await;
            }

            match this.behaviour {
                Behaviour::Succeed(value) => {
                    this.probe.finish(&task);
                    Ok(value)
                }
                Behaviour::Fail(message) => {
                    this.probe.finish(&task);
                    Err(anyhow!(message))
                }
                Behaviour::Panic(message) => panic!("{message}"),
                Behaviour::WaitForCancel => {
                    ctx.cancelled().await;
                    this.probe.mark_cancelled(&task);
                    Err(anyhow!("task '{task}' observed cancellation"))
                }
            }
        })
    }
}
