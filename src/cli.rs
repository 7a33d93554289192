// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `pipedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipedag",
    version,
    about = "Run a multi-stage pipeline described as a DAG of shell commands.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Pipedag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Enable a feature, including the tasks gated on it. Repeatable.
    #[arg(long = "feature", value_name = "NAME")]
    pub features: Vec<String>,

    /// Override `[config].max_concurrent_tasks`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_concurrent: Option<u64>,

    /// Parse + validate, print tasks in execution order, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final pipeline state as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_features_and_overrides() {
        let args = CliArgs::try_parse_from([
            "pipedag",
            "--config",
            "video.toml",
            "--feature",
            "captions",
            "--feature",
            "thumbnails",
            "--max-concurrent",
            "2",
            "--json",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("video.toml"));
        assert_eq!(args.features, vec!["captions", "thumbnails"]);
        assert_eq!(args.max_concurrent, Some(2));
        assert!(args.json);
        assert!(!args.dry_run);
    }

    #[test]
    fn rejects_zero_concurrency() {
        assert!(CliArgs::try_parse_from(["pipedag", "--max-concurrent", "0"]).is_err());
    }

    #[test]
    fn defaults_to_pipedag_toml() {
        let args = CliArgs::try_parse_from(["pipedag"]).unwrap();
        assert_eq!(args.config, PathBuf::from("Pipedag.toml"));
        assert!(args.features.is_empty());
        assert!(args.log_level.is_none());
    }
}
