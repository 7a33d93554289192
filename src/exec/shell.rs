// src/exec/shell.rs

//! Executor that runs a pipeline stage as a shell command.
//!
//! - Each dependency's result is exported as `PIPEDAG_DEP_<NAME>`
//!   (uppercased, non-alphanumerics replaced by `_`), and the task's own id
//!   as `PIPEDAG_TASK`.
//! - Stdout lines matching `progress_pattern` are turned into progress
//!   reports; all other stdout lines form the task's result.
//! - Stderr is consumed and logged at debug.
//! - On cancellation the child is killed.

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::exec::executor::{DependencyResults, ExecFuture, TaskContext, TaskExecutor};
use crate::types::TaskName;

/// Runs `cmd` through the platform shell; the result is its trimmed stdout.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    cmd: String,
    progress_pattern: Option<Regex>,
}

impl ShellExecutor {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            progress_pattern: None,
        }
    }

    /// Lines matching `pattern` report progress instead of contributing to
    /// the output. The percentage is read from the capture group named
    /// `percent`, else the first group, else the whole match.
    pub fn with_progress_pattern(mut self, pattern: Regex) -> Self {
        self.progress_pattern = Some(pattern);
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }
}

impl TaskExecutor<TaskName, String> for ShellExecutor {
    fn execute(
        &self,
        inputs: DependencyResults<TaskName, String>,
        ctx: TaskContext<TaskName>,
    ) -> ExecFuture<String> {
        let this = self.clone();
        Box::pin(async move { this.run(inputs, ctx).await })
    }
}

impl ShellExecutor {
    async fn run(
        self,
        inputs: DependencyResults<TaskName, String>,
        ctx: TaskContext<TaskName>,
    ) -> Result<String> {
        let task = ctx.task_id().clone();
        info!(task = %task, cmd = %self.cmd, "starting task process");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env("PIPEDAG_TASK", &task);
        for (dep, output) in inputs.iter() {
            cmd.env(dependency_env_var(dep), output);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{task}'"))?;

        let stdout = child
            .stdout
            .take()
            .context("child process has no stdout pipe")?;

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = child.stderr.take() {
            let task_name = task.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_name, "stderr: {}", line);
                }
            });
        }

        let reader = tokio::spawn(collect_stdout(
            stdout,
            self.progress_pattern.clone(),
            ctx.clone(),
        ));

        let status = tokio::select! {
            status = child.wait() => {
                status.with_context(|| format!("waiting for process of task '{task}'"))?
            }
            _ = ctx.cancelled() => {
                info!(task = %task, "run aborted; killing task process");
                if let Err(e) = child.kill().await {
                    warn!(task = %task, error = %e, "failed to kill child process on cancellation");
                }
                reader.abort();
                bail!("task '{task}' cancelled");
            }
        };

        let output = reader
            .await
            .context("stdout reader task failed")??;

        let code = status.code().unwrap_or(-1);
        info!(task = %task, exit_code = code, success = status.success(), "task process exited");

        if !status.success() {
            bail!("command `{}` exited with status {code}", self.cmd);
        }

        Ok(output)
    }
}

async fn collect_stdout(
    stdout: ChildStdout,
    progress_pattern: Option<Regex>,
    ctx: TaskContext<TaskName>,
) -> Result<String> {
    let mut lines = BufReader::new(stdout).lines();
    let mut output: Vec<String> = Vec::new();

    while let Some(line) = lines.next_line().await.context("reading task stdout")? {
        debug!(task = %ctx.task_id(), "stdout: {}", line);

        if let Some(re) = &progress_pattern {
            if let Some(percent) = parse_progress(re, &line) {
                ctx.report_progress(percent);
                continue;
            }
        }

        output.push(line);
    }

    Ok(output.join("\n").trim().to_string())
}

/// Extract a percentage from `line`, if it matches `re`.
pub fn parse_progress(re: &Regex, line: &str) -> Option<u8> {
    let caps = re.captures(line)?;
    let text = caps
        .name("percent")
        .or_else(|| caps.get(1))
        .or_else(|| caps.get(0))?
        .as_str();
    let value: f64 = text.trim().trim_end_matches('%').parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 100.0) as u8)
}

/// Environment variable name carrying a dependency's output.
pub fn dependency_env_var(dep: &str) -> String {
    let suffix: String = dep
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("PIPEDAG_DEP_{suffix}")
}
