// src/exec/executor.rs

//! The executor contract between the scheduler and the work of one task.
//!
//! An executor receives the results of the task's declared dependencies and
//! a [`TaskContext`], and eventually yields a result or an error. Anything
//! `Fn(DependencyResults, TaskContext) -> impl Future<Output = anyhow::Result<T>>`
//! is an executor; types with state can implement [`TaskExecutor`] directly.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::dag::task_info::TaskResults;
use crate::types::TaskKey;

/// Results of a task's declared dependencies, keyed by dependency id.
pub type DependencyResults<K, T> = TaskResults<K, T>;

/// Boxed future returned by executors.
pub type ExecFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'static>>;

/// Trait abstracting the work of one task.
pub trait TaskExecutor<K, T>: Send + Sync {
    fn execute(&self, inputs: DependencyResults<K, T>, ctx: TaskContext<K>) -> ExecFuture<T>;
}

impl<K, T, F, Fut> TaskExecutor<K, T> for F
where
    F: Fn(DependencyResults<K, T>, TaskContext<K>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn execute(&self, inputs: DependencyResults<K, T>, ctx: TaskContext<K>) -> ExecFuture<T> {
        Box::pin(self(inputs, ctx))
    }
}

/// Wraps an executor so that it fails once `timeout` elapses.
///
/// The inner future is dropped on timeout.
pub struct WithTimeout<E> {
    inner: E,
    timeout: Duration,
}

impl<E> WithTimeout<E> {
    pub fn new(inner: E, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<K, T, E> TaskExecutor<K, T> for WithTimeout<E>
where
    K: TaskKey,
    T: Send + 'static,
    E: TaskExecutor<K, T>,
{
    fn execute(&self, inputs: DependencyResults<K, T>, ctx: TaskContext<K>) -> ExecFuture<T> {
        let task = ctx.task_id().clone();
        let timeout = self.timeout;
        let fut = self.inner.execute(inputs, ctx);

        Box::pin(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("task '{task}' timed out after {timeout:?}")),
            }
        })
    }
}

/// Intermediate progress report sent from an executor to the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport<K> {
    pub task: K,
    pub percent: u8,
}

/// Per-invocation handle given to an executor.
#[derive(Debug, Clone)]
pub struct TaskContext<K> {
    task_id: K,
    cancel: CancellationToken,
    progress_tx: mpsc::UnboundedSender<ProgressReport<K>>,
}

impl<K: TaskKey> TaskContext<K> {
    pub fn new(
        task_id: K,
        cancel: CancellationToken,
        progress_tx: mpsc::UnboundedSender<ProgressReport<K>>,
    ) -> Self {
        Self {
            task_id,
            cancel,
            progress_tx,
        }
    }

    /// A context that is not attached to any run; reports go nowhere.
    pub fn detached(task_id: K) -> Self {
        let (progress_tx, _rx) = mpsc::unbounded_channel();
        Self::new(task_id, CancellationToken::new(), progress_tx)
    }

    pub fn task_id(&self) -> &K {
        &self.task_id
    }

    /// Report intermediate completion (clamped to 100). Never blocks.
    ///
    /// Reports sent after the run has ended are dropped.
    pub fn report_progress(&self, percent: u8) {
        let _ = self.progress_tx.send(ProgressReport {
            task: self.task_id.clone(),
            percent: percent.min(100),
        });
    }

    /// Token cancelled when the run is aborted.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is aborted.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_are_executors() {
        let exec = |inputs: DependencyResults<&'static str, u32>, _ctx: TaskContext<&'static str>| async move {
            anyhow::Ok(inputs.values().sum::<u32>() + 1)
        };

        let mut inputs: DependencyResults<&'static str, u32> = DependencyResults::new();
        inputs.insert("a", 2);
        inputs.insert("b", 3);

        let out = exec.execute(inputs, TaskContext::detached("c")).await.unwrap();
        assert_eq!(out, 6);
    }

    #[tokio::test]
    async fn timeout_wrapper_fails_slow_executors() {
        let slow = |_inputs: DependencyResults<&'static str, ()>, _ctx: TaskContext<&'static str>| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            anyhow::Ok(())
        };
        let wrapped = WithTimeout::new(slow, Duration::from_millis(20));

        let err = wrapped
            .execute(DependencyResults::<&'static str, ()>::new(), TaskContext::detached("slow"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn progress_reports_are_clamped_and_tagged() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = TaskContext::new("tts", CancellationToken::new(), tx);

        ctx.report_progress(250);

        assert_eq!(
            rx.recv().await,
            Some(ProgressReport {
                task: "tts",
                percent: 100
            })
        );
    }
}
