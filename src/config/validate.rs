// src/config/validate.rs

use regex::Regex;

use crate::config::model::{build_task_graph, parse_duration, PipelineFile, RawPipelineFile};
use crate::errors::{PipedagError, Result};

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = crate::errors::PipedagError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(PipelineFile::new_unchecked(raw.config, raw.features, raw.task))
    }
}

fn validate_raw_config(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_settings(cfg)?;
    // Unknown or self dependencies and cycles are the graph builder's errors.
    build_task_graph(&cfg.task)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipedagError::ConfigError(
            "pipeline must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawPipelineFile) -> Result<()> {
    // skip_policy is strongly typed and validated during deserialization.

    if cfg.config.max_concurrent_tasks == 0 {
        return Err(PipedagError::ConfigError(
            "[config].max_concurrent_tasks must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.default_weight == 0 {
        return Err(PipedagError::ConfigError(
            "[config].default_weight must be > 0 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_task_settings(cfg: &RawPipelineFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(PipedagError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                name
            )));
        }

        if task.weight == Some(0) {
            return Err(PipedagError::ConfigError(format!(
                "task '{}' has `weight = 0`; weights must be > 0",
                name
            )));
        }

        if let Some(ref timeout) = task.timeout {
            parse_duration(timeout).map_err(|e| {
                PipedagError::ConfigError(format!(
                    "task '{}' has invalid `timeout` '{}': {}",
                    name, timeout, e
                ))
            })?;
        }

        if let Some(ref pattern) = task.progress_pattern {
            Regex::new(pattern).map_err(|e| {
                PipedagError::ConfigError(format!(
                    "task '{}' has invalid `progress_pattern`: {}",
                    name, e
                ))
            })?;
        }

        if let Some(ref feature) = task.feature {
            if feature.trim().is_empty() {
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' has an empty `feature`",
                    name
                )));
            }
        }
    }
    Ok(())
}
