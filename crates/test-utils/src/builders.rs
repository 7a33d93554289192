// crates/test-utils/src/builders.rs

#![allow(dead_code)]

use std::collections::BTreeMap;

use pipedag::config::{ConfigSection, PipelineFile, RawPipelineFile, TaskConfig};
use pipedag::dag::TaskGraph;
use pipedag::types::SkipPolicy;

/// Build a `TaskGraph<&'static str>` from `(id, deps)` pairs, in order.
pub fn graph(tasks: &[(&'static str, &[&'static str])]) -> TaskGraph<&'static str> {
    let mut builder = TaskGraph::builder();
    for (id, deps) in tasks {
        builder.add_task(*id, deps.iter().copied());
    }
    builder.build().expect("Failed to build valid graph from test declarations")
}

/// Builder for `PipelineFile` to simplify test setup.
pub struct PipelineFileBuilder {
    config: RawPipelineFile,
}

impl PipelineFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawPipelineFile {
                config: ConfigSection::default(),
                features: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.config.config.max_concurrent_tasks = n;
        self
    }

    pub fn with_skip_policy(mut self, policy: SkipPolicy) -> Self {
        self.config.config.skip_policy = policy;
        self
    }

    pub fn with_default_weight(mut self, weight: u32) -> Self {
        self.config.config.default_weight = weight;
        self
    }

    pub fn with_feature(mut self, name: &str, enabled: bool) -> Self {
        self.config.features.insert(name.to_string(), enabled);
        self
    }

    /// The unvalidated file, for exercising validation errors.
    pub fn build_raw(self) -> RawPipelineFile {
        self.config
    }

    pub fn build(self) -> PipelineFile {
        PipelineFile::try_from(self.config).expect("Failed to build valid pipeline from builder")
    }
}

impl Default for PipelineFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                after: vec![],
                weight: None,
                timeout: None,
                progress_pattern: None,
                feature: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.task.weight = Some(weight);
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn progress_pattern(mut self, pattern: &str) -> Self {
        self.task.progress_pattern = Some(pattern.to_string());
        self
    }

    pub fn feature(mut self, feature: &str) -> Self {
        self.task.feature = Some(feature.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
