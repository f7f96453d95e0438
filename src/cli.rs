// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `scandag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scandag",
    version,
    about = "Run dependency-driven processing pipelines on scan datasets.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCANDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a task (and its upstream tasks) on one or more datasets.
    Run(RunArgs),
    /// Run a task on every dataset created below a database root.
    Watch(WatchArgs),
    /// List registered tasks and their parameters.
    Tasks,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Name of the task to run.
    pub task: String,

    /// Dataset paths (`<db-root>/<dataset-id>`); glob patterns are expanded.
    #[arg(required = true, value_name = "DATASET")]
    pub datasets: Vec<String>,

    /// Configuration file (TOML) or directory of TOML files.
    ///
    /// Without it, the dataset's backup record is reused.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Module the task must be registered in.
    #[arg(long, value_name = "NAME")]
    pub module: Option<String>,

    /// Resolve and print the execution plan, but don't run or write anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Name of the task to run on new datasets.
    pub task: String,

    /// Database root to watch.
    #[arg(value_name = "DB_ROOT")]
    pub db_root: PathBuf,

    /// Configuration file (TOML) or directory of TOML files.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Module the task must be registered in.
    #[arg(long, value_name = "NAME")]
    pub module: Option<String>,
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
