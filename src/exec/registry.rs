// src/exec/registry.rs

//! Association between task ids and the executors that perform their work.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::exec::executor::TaskExecutor;
use crate::types::TaskKey;

/// Shared, type-erased executor.
pub type SharedExecutor<K, T> = Arc<dyn TaskExecutor<K, T>>;

/// Map of task id to executor.
///
/// The registry itself does not know the graph; `Orchestrator` rejects ids
/// that are not declared before inserting.
pub struct ExecutorRegistry<K, T> {
    executors: HashMap<K, SharedExecutor<K, T>>,
}

impl<K: TaskKey, T> Default for ExecutorRegistry<K, T> {
    fn default() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }
}

impl<K: TaskKey, T> fmt::Debug for ExecutorRegistry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&K> = self.executors.keys().collect();
        ids.sort();
        f.debug_struct("ExecutorRegistry")
            .field("registered", &ids)
            .finish()
    }
}

impl<K: TaskKey, T> ExecutorRegistry<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the executor for `id`.
    pub fn insert(&mut self, id: K, executor: SharedExecutor<K, T>) {
        if self.executors.contains_key(&id) {
            warn!(task = %id, "replacing previously registered executor");
        }
        self.executors.insert(id, executor);
    }

    pub fn get(&self, id: &K) -> Option<SharedExecutor<K, T>> {
        self.executors.get(id).cloned()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.executors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
