// src/types.rs

use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use serde::Deserialize;

/// Canonical task id type used by the CLI and config layer.
pub type TaskName = String;

/// Requirements for a task identifier.
///
/// Blanket-implemented, so `String`, `&'static str`, integers or a
/// caller-defined `enum Stage { .. }` all work as ids.
pub trait TaskKey: Clone + Eq + Hash + Ord + Debug + Display + Send + Sync + 'static {}

impl<K> TaskKey for K where K: Clone + Eq + Hash + Ord + Debug + Display + Send + Sync + 'static {}

/// What happens to the dependents of a task that was skipped.
///
/// - `Propagate`: a pending task with a skipped dependency is itself skipped,
///   transitively (default).
/// - `Strict`: a skipped dependency never satisfies readiness; dependents
///   stay pending and the run ends in a structural deadlock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipPolicy {
    #[default]
    Propagate,
    Strict,
}

impl FromStr for SkipPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "propagate" => Ok(SkipPolicy::Propagate),
            "strict" => Ok(SkipPolicy::Strict),
            other => Err(format!(
                "invalid skip_policy: {other} (expected \"propagate\" or \"strict\")"
            )),
        }
    }
}

/// Default concurrency ceiling when none is configured.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 4;

/// Inputs the orchestrator needs from its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Upper bound on simultaneously running tasks. Always >= 1.
    pub max_concurrent_tasks: usize,
    pub skip_policy: SkipPolicy,
    /// Enabled pipeline-variant flags. Only consulted while the graph and
    /// registry are being assembled, never during a run.
    pub features: BTreeSet<String>,
}

impl RunConfig {
    pub fn new(max_concurrent_tasks: usize) -> Self {
        Self {
            max_concurrent_tasks: max_concurrent_tasks.max(1),
            ..Self::default()
        }
    }

    pub fn with_skip_policy(mut self, policy: SkipPolicy) -> Self {
        self.skip_policy = policy;
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            skip_policy: SkipPolicy::default(),
            features: BTreeSet::new(),
        }
    }
}
