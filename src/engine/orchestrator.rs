// src/engine/orchestrator.rs

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::scheduler::Scheduler;
use crate::dag::scheduler_step::{RunOutlook, SchedulerStep};
use crate::dag::task_info::{PipelineState, TaskResults};
use crate::dag::TaskGraph;
use crate::errors::{PipedagError, Result};
use crate::events::{ChannelSink, EventBus, EventSink, PipelineEvent};
use crate::exec::executor::{
    DependencyResults, ProgressReport, TaskContext, TaskExecutor, WithTimeout,
};
use crate::exec::registry::{ExecutorRegistry, SharedExecutor};
use crate::progress::TaskWeights;
use crate::types::{RunConfig, TaskKey};

/// What a settled executor hands back to the scheduling loop.
type Settlement<K, T> = (K, anyhow::Result<T>);

/// Drives one pipeline run.
///
/// This is the async shell around the pure [`Scheduler`]: it launches
/// executors as Tokio tasks, waits for the earliest one to settle, feeds the
/// outcome back into the scheduler and emits events. All bookkeeping happens
/// on the task calling [`run`](Self::run); executors only communicate
/// through their return value and the progress channel.
///
/// One orchestrator is constructed per run; there is no shared global
/// instance.
pub struct Orchestrator<K, T> {
    scheduler: Scheduler<K, T>,
    registry: ExecutorRegistry<K, T>,
    events: EventBus<K, T>,
    cancel: CancellationToken,
    progress_tx: mpsc::UnboundedSender<ProgressReport<K>>,
    progress_rx: mpsc::UnboundedReceiver<ProgressReport<K>>,
    state_tx: watch::Sender<PipelineState<K, T>>,
    run_called: bool,
}

impl<K, T> fmt::Debug for Orchestrator<K, T>
where
    K: TaskKey,
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("scheduler", &self.scheduler)
            .field("registry", &self.registry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl<K, T> Orchestrator<K, T>
where
    K: TaskKey,
    T: Clone + Send + Sync + 'static,
{
    /// Orchestrator with baseline weights for every task.
    pub fn new(graph: TaskGraph<K>, config: RunConfig) -> Self {
        Self::with_weights(graph, TaskWeights::new(), config)
    }

    pub fn with_weights(graph: TaskGraph<K>, weights: TaskWeights<K>, config: RunConfig) -> Self {
        let scheduler = Scheduler::new(graph, weights, config);
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(scheduler.snapshot());

        Self {
            scheduler,
            registry: ExecutorRegistry::new(),
            events: EventBus::new(),
            cancel: CancellationToken::new(),
            progress_tx,
            progress_rx,
            state_tx,
            run_called: false,
        }
    }

    pub fn run_id(&self) -> &str {
        self.scheduler.run_id()
    }

    pub fn graph(&self) -> &TaskGraph<K> {
        self.scheduler.graph()
    }

    pub fn config(&self) -> &RunConfig {
        self.scheduler.config()
    }

    /// Register the work for `id`.
    ///
    /// The closure receives the results of `id`'s declared dependencies and
    /// a [`TaskContext`]. Registering again for the same id replaces the
    /// previous executor.
    pub fn register_executor<F, Fut>(&mut self, id: K, executor: F) -> Result<()>
    where
        F: Fn(DependencyResults<K, T>, TaskContext<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert_executor(id, Arc::new(executor))
    }

    /// Like [`register_executor`](Self::register_executor), failing the task
    /// once `timeout` elapses.
    pub fn register_executor_with_timeout<F, Fut>(
        &mut self,
        id: K,
        timeout: Duration,
        executor: F,
    ) -> Result<()>
    where
        F: Fn(DependencyResults<K, T>, TaskContext<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert_executor(id, Arc::new(WithTimeout::new(executor, timeout)))
    }

    /// Register any [`TaskExecutor`] implementation.
    pub fn register_task_executor<E>(&mut self, id: K, executor: E) -> Result<()>
    where
        E: TaskExecutor<K, T> + 'static,
    {
        self.insert_executor(id, Arc::new(executor))
    }

    fn insert_executor(&mut self, id: K, executor: SharedExecutor<K, T>) -> Result<()> {
        if !self.scheduler.graph().contains(&id) {
            return Err(PipedagError::ConfigError(format!(
                "cannot register executor for unknown task '{id}'"
            )));
        }
        if self.run_called {
            return Err(PipedagError::ConfigError(format!(
                "cannot register executor for task '{id}' after the run has started"
            )));
        }
        debug!(task = %id, "executor registered");
        self.registry.insert(id, executor);
        Ok(())
    }

    pub fn has_executor(&self, id: &K) -> bool {
        self.registry.contains(id)
    }

    /// Add an observer.
    pub fn subscribe<S>(&mut self, sink: S)
    where
        S: EventSink<K, T> + 'static,
    {
        self.events.subscribe(Arc::new(sink));
    }

    /// Add an observer that is shared with the caller.
    pub fn subscribe_shared(&mut self, sink: Arc<dyn EventSink<K, T>>) {
        self.events.subscribe(sink);
    }

    /// Subscribe a [`ChannelSink`] and return its receiving end.
    pub fn event_channel(&mut self) -> mpsc::UnboundedReceiver<PipelineEvent<K, T>> {
        let (sink, rx) = ChannelSink::channel();
        self.subscribe(sink);
        rx
    }

    /// Token that aborts the run with [`PipedagError::Cancelled`] when
    /// cancelled. Executors see a child of it in their context.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver of state snapshots, refreshed after every transition and
    /// progress report.
    pub fn state_watch(&self) -> watch::Receiver<PipelineState<K, T>> {
        self.state_tx.subscribe()
    }

    /// Defensive copy of the current state.
    pub fn get_state(&self) -> PipelineState<K, T> {
        self.scheduler.snapshot()
    }

    /// Defensive copy of the results of completed tasks.
    pub fn get_results(&self) -> TaskResults<K, T> {
        self.scheduler.results()
    }

    pub fn total_progress(&self) -> u8 {
        self.scheduler.total_progress()
    }

    /// Record intermediate progress for a running task (clamped to 100).
    ///
    /// Executors report through [`TaskContext::report_progress`], which ends
    /// up here on the scheduling loop.
    pub fn update_task_progress(&mut self, id: &K, percent: u8) {
        if let Some(total) = self.scheduler.update_progress(id, percent) {
            self.emit(PipelineEvent::ProgressChanged { percent: total });
        }
        self.publish_state();
    }

    /// Execute the pipeline.
    ///
    /// Resolves with the results of every completed task once every task is
    /// completed or skipped. Fails fast with the first task failure, with
    /// [`PipedagError::StructuralDeadlock`] if remaining tasks can never
    /// start, or with [`PipedagError::Cancelled`]. On failure, in-flight
    /// executors are signalled through their cancellation token and left to
    /// finish in the background; their outcomes are discarded.
    ///
    /// May be called once per orchestrator.
    pub async fn run(&mut self) -> Result<TaskResults<K, T>> {
        if self.run_called {
            return Err(PipedagError::ConfigError(
                "run() may only be called once per orchestrator".to_string(),
            ));
        }
        self.run_called = true;

        if self.scheduler.config().max_concurrent_tasks == 0 {
            return Err(PipedagError::ConfigError(
                "max_concurrent_tasks must be >= 1 (got 0)".to_string(),
            ));
        }

        let clock = Instant::now();
        self.scheduler.begin();
        let run_id = self.scheduler.run_id().to_string();
        self.emit(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
        });
        self.publish_state();

        let mut in_flight: JoinSet<Settlement<K, T>> = JoinSet::new();
        let outcome = self.drive(&mut in_flight).await;

        self.scheduler.finish();
        let duration_ms = clock.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                let results = self.scheduler.results();
                info!(
                    run_id = %run_id,
                    duration_ms,
                    completed = results.len(),
                    "pipeline run finished"
                );
                self.emit(PipelineEvent::RunCompleted {
                    run_id,
                    duration_ms,
                    results: results.clone(),
                });
                self.publish_state();
                Ok(results)
            }
            Err(err) => {
                self.cancel.cancel();
                let abandoned = in_flight.len();
                // Let in-flight executors observe cancellation and wind down
                // on their own; their outcomes are not incorporated.
                in_flight.detach_all();
                error!(
                    run_id = %run_id,
                    duration_ms,
                    abandoned,
                    error = %err,
                    "pipeline run aborted"
                );
                self.emit(PipelineEvent::RunFailed {
                    run_id,
                    error: err.to_string(),
                });
                self.publish_state();
                Err(err)
            }
        }
    }

    /// Main scheduling loop: one readiness scan per settlement.
    async fn drive(&mut self, in_flight: &mut JoinSet<Settlement<K, T>>) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PipedagError::Cancelled);
            }

            let registry = &self.registry;
            let step = self.scheduler.step(|id| registry.contains(id));
            self.apply_step(step, in_flight);

            match self.scheduler.outlook() {
                RunOutlook::InFlight => {}
                RunOutlook::Finished => return Ok(()),
                RunOutlook::Deadlocked(blocked) => {
                    let blocked: Vec<String> = blocked.iter().map(|k| k.to_string()).collect();
                    error!(?blocked, "no task running and none can start");
                    return Err(PipedagError::StructuralDeadlock { blocked });
                }
            }

            let (task, outcome) = self.next_settlement(in_flight).await?;
            match outcome {
                Ok(value) => self.handle_success(&task, value),
                Err(err) => {
                    self.handle_failure(&task, &err);
                    return Err(PipedagError::task_execution(task.to_string(), err));
                }
            }
        }
    }

    /// Emit events for a step and launch the tasks it started.
    fn apply_step(&mut self, step: SchedulerStep<K>, in_flight: &mut JoinSet<Settlement<K, T>>) {
        if step.is_empty() {
            return;
        }
        for task in &step.skipped {
            self.emit(PipelineEvent::TaskSkipped { task: task.clone() });
        }
        if let Some(percent) = step.progress {
            self.emit(PipelineEvent::ProgressChanged { percent });
        }
        for task in step.started {
            self.launch(task, in_flight);
        }
        self.publish_state();
    }

    fn launch(&mut self, task: K, in_flight: &mut JoinSet<Settlement<K, T>>) {
        let Some(executor) = self.registry.get(&task) else {
            // step() only starts tasks that have an executor.
            warn!(task = %task, "started task has no executor");
            return;
        };

        let inputs = self.scheduler.dependency_results(&task);
        let ctx = TaskContext::new(task.clone(), self.cancel.child_token(), self.progress_tx.clone());

        info!(
            run_id = %self.scheduler.run_id(),
            task = %task,
            inputs = inputs.len(),
            "launching task"
        );
        self.emit(PipelineEvent::TaskStarted { task: task.clone() });

        in_flight.spawn(async move {
            // Inner task so that a panicking executor surfaces as a JoinError
            // for this task instead of tearing down the settlement.
            let outcome = match tokio::spawn(async move { executor.execute(inputs, ctx).await }).await {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => Err(anyhow!("executor panicked")),
                Err(join_err) => Err(anyhow!("executor task aborted: {join_err}")),
            };
            (task, outcome)
        });
    }

    /// Wait for the earliest in-flight task to settle, applying progress
    /// reports that arrive meanwhile.
    async fn next_settlement(
        &mut self,
        in_flight: &mut JoinSet<Settlement<K, T>>,
    ) -> Result<Settlement<K, T>> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    warn!(run_id = %self.scheduler.run_id(), "cancellation requested");
                    return Err(PipedagError::Cancelled);
                }

                Some(report) = self.progress_rx.recv() => {
                    self.update_task_progress(&report.task, report.percent);
                }

                joined = in_flight.join_next() => {
                    return match joined {
                        Some(Ok(settlement)) => Ok(settlement),
                        Some(Err(join_err)) => Err(PipedagError::Other(anyhow!(
                            "settlement task failed: {join_err}"
                        ))),
                        None => Err(PipedagError::Other(anyhow!(
                            "waiting for a settlement with no task in flight"
                        ))),
                    };
                }
            }
        }
    }

    fn handle_success(&mut self, task: &K, value: T) {
        let Some(settled) = self.scheduler.complete(task, value.clone()) else {
            return;
        };
        self.emit(PipelineEvent::TaskCompleted {
            task: task.clone(),
            result: value,
            duration_ms: settled.duration_ms,
        });
        if let Some(percent) = settled.progress {
            self.emit(PipelineEvent::ProgressChanged { percent });
        }
        self.publish_state();
    }

    fn handle_failure(&mut self, task: &K, err: &anyhow::Error) {
        let message = format!("{err:#}");
        let settled = self.scheduler.fail(task, message.clone());
        self.emit(PipelineEvent::TaskFailed {
            task: task.clone(),
            error: message,
        });
        if let Some(percent) = settled.and_then(|s| s.progress) {
            self.emit(PipelineEvent::ProgressChanged { percent });
        }
        self.publish_state();
    }

    fn emit(&self, event: PipelineEvent<K, T>) {
        self.events.emit(&event);
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.scheduler.snapshot());
    }
}
