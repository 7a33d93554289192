// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod progress;
pub mod types;

pub use dag::{PipelineState, TaskGraph, TaskGraphBuilder, TaskNode, TaskResults, TaskStatus};
pub use engine::Orchestrator;
pub use errors::{PipedagError, Result};
pub use events::{ChannelSink, EventSink, PipelineEvent, TracingSink};
pub use exec::{DependencyResults, TaskContext, TaskExecutor};
pub use progress::{TaskWeights, DEFAULT_TASK_WEIGHT};
pub use types::{RunConfig, SkipPolicy, TaskKey, TaskName};

use anyhow::Context;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::PipelineFile;
use crate::exec::{ShellExecutor, WithTimeout};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline file loading and CLI overrides
/// - graph, weights and one shell executor per included task
/// - Ctrl-C handling
/// - result / state output on stdout
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let config_path = &args.config;
    let cfg = load_and_validate(config_path)
        .with_context(|| format!("failed to load pipeline file {}", config_path.display()))?;

    let mut run_config = cfg.to_run_config(args.features.iter().map(String::as_str));
    if let Some(n) = args.max_concurrent {
        run_config.max_concurrent_tasks = usize::try_from(n)
            .context("--max-concurrent is out of range")?
            .max(1);
    }

    if args.dry_run {
        print_dry_run(&cfg, &run_config)?;
        return Ok(());
    }

    let mut orchestrator = build_orchestrator(&cfg, run_config)?;
    orchestrator.subscribe(TracingSink);

    // Ctrl-C → cancel the run; in-flight commands are killed.
    {
        let cancel = orchestrator.cancellation_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling run");
            cancel.cancel();
        });
    }

    let outcome = orchestrator.run().await;
    let state = orchestrator.get_state();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        for node in state.tasks.iter() {
            println!("{:<24} {:?}", node.id, node.status);
        }
    }

    outcome?;
    Ok(())
}

/// Build an orchestrator for a validated pipeline file.
///
/// Every declared task is part of the graph. Tasks whose `feature` is not
/// enabled in `run_config` get no executor and therefore resolve to
/// skipped.
pub fn build_orchestrator(
    cfg: &PipelineFile,
    run_config: RunConfig,
) -> Result<Orchestrator<TaskName, String>> {
    let graph = cfg.to_task_graph()?;
    let weights = cfg.to_weights()?;
    let mut orchestrator = Orchestrator::with_weights(graph, weights, run_config.clone());

    for (name, task) in cfg.task.iter() {
        if !cfg.is_included(task, &run_config) {
            info!(task = %name, feature = ?task.feature, "feature disabled; task will be skipped");
            continue;
        }

        let mut executor = ShellExecutor::new(task.cmd.clone());
        if let Some(ref pattern) = task.progress_pattern {
            let re = Regex::new(pattern).map_err(|e| {
                PipedagError::ConfigError(format!(
                    "task '{name}' has invalid `progress_pattern`: {e}"
                ))
            })?;
            executor = executor.with_progress_pattern(re);
        }

        match task.timeout_duration() {
            Some(timeout) => {
                debug!(task = %name, ?timeout, "registering shell executor with timeout");
                orchestrator.register_task_executor(name.clone(), WithTimeout::new(executor, timeout))?;
            }
            None => orchestrator.register_task_executor(name.clone(), executor)?,
        }
    }

    Ok(orchestrator)
}

/// Simple dry-run output: tasks in execution order with their settings.
fn print_dry_run(cfg: &PipelineFile, run_config: &RunConfig) -> Result<()> {
    let graph = cfg.to_task_graph()?;

    println!("pipedag dry-run");
    println!("  config.max_concurrent_tasks = {}", run_config.max_concurrent_tasks);
    println!("  config.skip_policy = {:?}", run_config.skip_policy);
    println!("  features = {:?}", run_config.features);
    println!();

    println!("tasks ({}), in execution order:", graph.len());
    for name in graph.topological_order() {
        let Some(task) = cfg.task.get(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        println!(
            "      weight: {}",
            task.effective_weight(cfg.config.default_weight)
        );
        if let Some(ref timeout) = task.timeout {
            println!("      timeout: {timeout}");
        }
        if let Some(ref pattern) = task.progress_pattern {
            println!("      progress_pattern: {pattern}");
        }
        if let Some(ref feature) = task.feature {
            let state = if run_config.feature_enabled(feature) {
                "enabled"
            } else {
                "disabled, will be skipped"
            };
            println!("      feature: {feature} ({state})");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
