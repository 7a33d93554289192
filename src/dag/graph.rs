// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::errors::{PipedagError, Result};
use crate::types::TaskKey;

/// Internal node structure: stores immediate deps and dependents by index.
#[derive(Debug, Clone)]
struct DagNode<K> {
    id: K,
    /// Direct dependencies, in declaration order.
    deps: Vec<usize>,
    /// Direct dependents: tasks that list this one as a dependency.
    dependents: Vec<usize>,
}

/// Immutable, validated DAG of tasks.
///
/// Nodes keep their declaration order; index `i` refers to the `i`-th task
/// passed to [`TaskGraphBuilder::add_task`]. Acyclicity and dependency
/// references are checked once in [`TaskGraphBuilder::build`].
#[derive(Debug, Clone)]
pub struct TaskGraph<K> {
    nodes: Vec<DagNode<K>>,
    index: HashMap<K, usize>,
}

impl<K: TaskKey> TaskGraph<K> {
    pub fn builder() -> TaskGraphBuilder<K> {
        TaskGraphBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.index.contains_key(id)
    }

    /// Task ids in declaration order.
    pub fn task_ids(&self) -> impl Iterator<Item = &K> {
        self.nodes.iter().map(|n| &n.id)
    }

    /// Tasks without dependencies.
    pub fn roots(&self) -> impl Iterator<Item = &K> {
        self.nodes.iter().filter(|n| n.deps.is_empty()).map(|n| &n.id)
    }

    /// Immediate dependencies of a task, in declaration order.
    pub fn dependencies_of(&self, id: &K) -> Vec<&K> {
        self.index_of(id)
            .map(|i| self.nodes[i].deps.iter().map(|&d| &self.nodes[d].id).collect())
            .unwrap_or_default()
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &K) -> Vec<&K> {
        self.index_of(id)
            .map(|i| {
                self.nodes[i]
                    .dependents
                    .iter()
                    .map(|&d| &self.nodes[d].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A topological order of the tasks (dependencies first).
    ///
    /// Ties are broken by declaration order.
    pub fn topological_order(&self) -> Vec<&K> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.deps.len()).collect();
        let mut emitted = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        while order.len() < self.nodes.len() {
            let Some(next) = (0..self.nodes.len()).find(|&i| !emitted[i] && remaining[i] == 0)
            else {
                // Unreachable for a graph produced by the builder.
                break;
            };
            emitted[next] = true;
            for &dependent in &self.nodes[next].dependents {
                remaining[dependent] -= 1;
            }
            order.push(&self.nodes[next].id);
        }

        order
    }

    pub(crate) fn index_of(&self, id: &K) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn id_at(&self, idx: usize) -> &K {
        &self.nodes[idx].id
    }

    pub(crate) fn deps_at(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].deps
    }
}

/// Collects task declarations; consumed by [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct TaskGraphBuilder<K> {
    declared: Vec<(K, Vec<K>)>,
}

impl<K: TaskKey> Default for TaskGraphBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TaskKey> TaskGraphBuilder<K> {
    pub fn new() -> Self {
        Self {
            declared: Vec::new(),
        }
    }

    /// Declare one task and its dependencies.
    ///
    /// Dependencies may refer to tasks declared later; references are
    /// resolved in [`build`](Self::build).
    pub fn add_task<I>(&mut self, id: K, dependencies: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut deps: Vec<K> = Vec::new();
        for dep in dependencies {
            // Ordered set: keep the first occurrence only.
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        self.declared.push((id, deps));
        self
    }

    /// Chaining variant of [`add_task`](Self::add_task).
    pub fn task<I>(mut self, id: K, dependencies: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        self.add_task(id, dependencies);
        self
    }

    /// Validate the declarations and produce an immutable [`TaskGraph`].
    ///
    /// Fails with:
    /// - `ConfigError` for duplicate ids, self-dependencies, or references to
    ///   undeclared tasks,
    /// - `DagCycle` if the dependency edges form a cycle.
    pub fn build(self) -> Result<TaskGraph<K>> {
        let mut index: HashMap<K, usize> = HashMap::with_capacity(self.declared.len());
        for (i, (id, _)) in self.declared.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(PipedagError::ConfigError(format!(
                    "task '{id}' is declared more than once"
                )));
            }
        }

        let mut nodes: Vec<DagNode<K>> = Vec::with_capacity(self.declared.len());
        for (id, deps) in self.declared.iter() {
            let mut dep_indices = Vec::with_capacity(deps.len());
            for dep in deps {
                if dep == id {
                    return Err(PipedagError::ConfigError(format!(
                        "task '{id}' cannot depend on itself"
                    )));
                }
                let Some(&dep_idx) = index.get(dep) else {
                    return Err(PipedagError::ConfigError(format!(
                        "task '{id}' has unknown dependency '{dep}'"
                    )));
                };
                dep_indices.push(dep_idx);
            }
            nodes.push(DagNode {
                id: id.clone(),
                deps: dep_indices,
                dependents: Vec::new(),
            });
        }

        for i in 0..nodes.len() {
            let deps = nodes[i].deps.clone();
            for dep in deps {
                nodes[dep].dependents.push(i);
            }
        }

        ensure_acyclic(&nodes)?;

        debug!(task_count = nodes.len(), "task graph built");
        Ok(TaskGraph { nodes, index })
    }
}

fn ensure_acyclic<K: TaskKey>(nodes: &[DagNode<K>]) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), 0);
    let handles: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

    for (i, node) in nodes.iter().enumerate() {
        for &dep in &node.deps {
            graph.add_edge(handles[dep], handles[i], ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let task = &nodes[graph[cycle.node_id()]].id;
            Err(PipedagError::DagCycle(format!(
                "cycle detected in task DAG involving task '{task}'"
            )))
        }
    }
}
