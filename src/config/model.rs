// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::TaskGraph;
use crate::errors::Result;
use crate::progress::{TaskWeights, DEFAULT_TASK_WEIGHT};
use crate::types::{RunConfig, SkipPolicy, TaskName, DEFAULT_MAX_CONCURRENT_TASKS};

/// Pipeline file as read from TOML, before semantic validation.
///
/// ```toml
/// [config]
/// max_concurrent_tasks = 2
/// skip_policy = "propagate"
///
/// [features]
/// captions = true
///
/// [task.script]
/// cmd = "generate-script"
///
/// [task.tts]
/// cmd = "synthesize"
/// after = ["script"]
/// weight = 30
/// timeout = "5m"
/// progress_pattern = "(\\d+)%"
///
/// [task.captions]
/// cmd = "burn-captions"
/// after = ["tts"]
/// feature = "captions"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPipelineFile {
    /// Run settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Feature flags from `[features]`.
    #[serde(default)]
    pub features: BTreeMap<String, bool>,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated pipeline file.
///
/// Only obtainable through `TryFrom<RawPipelineFile>` (see
/// `config::validate`), so every instance has known dependencies, no
/// cycles, positive weights and parseable timeouts and patterns.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub config: ConfigSection,
    pub features: BTreeMap<String, bool>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        features: BTreeMap<String, bool>,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            features,
            task,
        }
    }

    /// Features switched on in `[features]`.
    pub fn enabled_features(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
    }

    /// Task graph over all declared tasks, feature-gated ones included.
    ///
    /// Tasks are declared in name order.
    pub fn to_task_graph(&self) -> Result<TaskGraph<TaskName>> {
        build_task_graph(&self.task)
    }

    pub fn to_weights(&self) -> Result<TaskWeights<TaskName>> {
        let mut weights = TaskWeights::new().with_default_weight(self.config.default_weight)?;
        for (name, task) in self.task.iter() {
            if let Some(weight) = task.weight {
                weights.set(name.clone(), weight)?;
            }
        }
        Ok(weights)
    }

    /// Run settings from `[config]` and `[features]`, plus `extra_features`
    /// switched on from the command line.
    pub fn to_run_config<'a>(
        &'a self,
        extra_features: impl IntoIterator<Item = &'a str>,
    ) -> RunConfig {
        let mut run_config = RunConfig::new(self.config.max_concurrent_tasks)
            .with_skip_policy(self.config.skip_policy);
        for feature in self.enabled_features().chain(extra_features) {
            run_config = run_config.with_feature(feature);
        }
        run_config
    }

    /// Whether `task` gets an executor under `run_config`.
    pub fn is_included(&self, task: &TaskConfig, run_config: &RunConfig) -> bool {
        match task.feature {
            Some(ref feature) => run_config.feature_enabled(feature),
            None => true,
        }
    }
}

/// Task graph over `[task.*]` tables, in name order.
pub(crate) fn build_task_graph(
    tasks: &BTreeMap<String, TaskConfig>,
) -> Result<TaskGraph<TaskName>> {
    let mut builder = TaskGraph::builder();
    for (name, task) in tasks.iter() {
        builder.add_task(name.clone(), task.after.iter().cloned());
    }
    builder.build()
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Upper bound on simultaneously running tasks (>= 1).
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// `"propagate"` (default) or `"strict"`.
    #[serde(default)]
    pub skip_policy: SkipPolicy,

    /// Progress weight for tasks without their own `weight` (> 0).
    #[serde(default = "default_weight")]
    pub default_weight: u32,
}

fn default_max_concurrent_tasks() -> usize {
    DEFAULT_MAX_CONCURRENT_TASKS
}

fn default_weight() -> u32 {
    DEFAULT_TASK_WEIGHT
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            skip_policy: SkipPolicy::default(),
            default_weight: default_weight(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// The command to execute.
    pub cmd: String,

    /// Dependency list: this task waits for all tasks listed here and
    /// receives their outputs.
    #[serde(default)]
    pub after: Vec<String>,

    /// Relative progress weight; falls back to `[config].default_weight`.
    #[serde(default)]
    pub weight: Option<u32>,

    /// Duration string (e.g. `"30s"`) after which the task fails.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Regex for stdout lines that carry a progress percentage.
    #[serde(default)]
    pub progress_pattern: Option<String>,

    /// Only run this task when the named feature is enabled. Otherwise it
    /// stays in the graph without an executor and resolves to skipped.
    #[serde(default)]
    pub feature: Option<String>,
}

impl TaskConfig {
    /// Effective weight given the `[config]` default.
    pub fn effective_weight(&self, default_weight: u32) -> u32 {
        self.weight.unwrap_or(default_weight)
    }

    /// Parsed `timeout`, if set and valid.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.as_deref().and_then(|s| parse_duration(s).ok())
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs_times(value, 60),
        "h" => secs_times(value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn secs_times(value: u64, factor: u64) -> std::result::Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration out of range: {value} * {factor}s"))
}
