// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod storage;
pub mod task;
pub mod types;
pub mod watch;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cli::{CliArgs, Command, RunArgs, WatchArgs};
use crate::config::load_from_path;
use crate::config::model::{PipelineConfig, RetcodeSection};
use crate::engine::{BatchReport, Pipeline, TaskRequest};
use crate::errors::{Result, ScandagError};
use crate::storage::FsStorage;
use crate::storage::fsdb::split_dataset_path;
use crate::task::TaskRegistry;

/// High-level entry point used by `main.rs`, with the built-in tasks.
///
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> i32 {
    run_with_registry(args, TaskRegistry::builtin()).await
}

/// Entry point for binaries that register their own tasks.
pub async fn run_with_registry(args: CliArgs, registry: TaskRegistry) -> i32 {
    match args.command {
        Command::Run(run) => run_command(run, registry).await,
        Command::Watch(watch) => watch_command(watch, registry).await,
        Command::Tasks => {
            print_tasks(&registry);
            0
        }
    }
}

fn load_explicit_config(path: Option<&Path>) -> Result<toml::Table> {
    match path {
        Some(path) => {
            info!(config = %path.display(), "loading configuration");
            load_from_path(path)
        }
        None => Ok(toml::Table::new()),
    }
}

/// Exit codes come from the explicit configuration when it is readable.
fn retcodes(config: &toml::Table) -> RetcodeSection {
    PipelineConfig::new(config.clone())
        .retcode()
        .unwrap_or_default()
}

fn fail(err: &ScandagError, codes: &RetcodeSection) -> i32 {
    error!(error = %err, "aborting");
    err.retcode(codes)
}

/// Expand dataset arguments. A pattern without matches is kept as a
/// literal path so source tasks can name a dataset that does not exist yet.
fn expand_datasets(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|err| ScandagError::ConfigError(format!("bad dataset pattern '{pattern}': {err}")))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_dir())
            .collect();
        if matches.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            paths.extend(matches);
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Group dataset ids by database root.
fn group_by_root(paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, Vec<String>>> {
    let mut groups: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for path in paths {
        let (root, id) = split_dataset_path(path)?;
        groups.entry(root).or_default().push(id);
    }
    Ok(groups)
}

async fn run_command(args: RunArgs, registry: TaskRegistry) -> i32 {
    let default_codes = RetcodeSection::default();
    let explicit = match load_explicit_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return fail(&err, &default_codes),
    };
    let codes = retcodes(&explicit);

    let spec = match registry.lookup(&args.task, args.module.as_deref()) {
        Ok(spec) => spec,
        Err(err) => return fail(&err, &codes),
    };
    let paths = match expand_datasets(&args.datasets) {
        Ok(paths) => paths,
        Err(err) => return fail(&err, &codes),
    };
    if spec.source && paths.len() != 1 {
        let err = ScandagError::ConfigError(format!(
            "source task '{}' takes exactly one dataset path, got {}",
            spec.name,
            paths.len()
        ));
        return fail(&err, &codes);
    }
    let groups = match group_by_root(&paths) {
        Ok(groups) => groups,
        Err(err) => return fail(&err, &codes),
    };

    let mut request = TaskRequest::new(&args.task).with_config(explicit);
    request.module = args.module.clone();

    if args.dry_run {
        return dry_run(&registry, &request, &groups, &codes);
    }

    let mut report = BatchReport::default();
    for (root, ids) in &groups {
        let pipeline = Pipeline::new(registry.clone(), Arc::new(FsStorage::new(root)));
        report.extend(pipeline.execute_batch(&request, ids).await);
    }

    match report.failed.first() {
        _ if report.processed() == 0 => {
            warn!("no dataset processed");
            codes.not_run
        }
        None => 0,
        Some((dataset, err)) => {
            error!(
                failed = ?report.failed_datasets(),
                "{} of {} datasets failed",
                report.failed.len(),
                report.processed()
            );
            let code = err.retcode(&codes);
            info!(dataset = %dataset, code, "exit code taken from first failure");
            code
        }
    }
}

fn dry_run(
    registry: &TaskRegistry,
    request: &TaskRequest,
    groups: &BTreeMap<PathBuf, Vec<String>>,
    codes: &RetcodeSection,
) -> i32 {
    let mut code = 0;
    for (root, ids) in groups {
        let pipeline = Pipeline::new(registry.clone(), Arc::new(FsStorage::new(root)));
        for id in ids {
            match pipeline.plan(request, id) {
                Ok(plan) => print!("{plan}"),
                Err(err) => {
                    error!(dataset = %id, error = %err, "cannot plan dataset");
                    if code == 0 {
                        code = err.retcode(codes);
                    }
                }
            }
        }
    }
    code
}

async fn watch_command(args: WatchArgs, registry: TaskRegistry) -> i32 {
    let default_codes = RetcodeSection::default();
    let explicit = match load_explicit_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return fail(&err, &default_codes),
    };
    let codes = retcodes(&explicit);
    if let Err(err) = registry.lookup(&args.task, args.module.as_deref()) {
        return fail(&err, &codes);
    }

    let mut request = TaskRequest::new(&args.task).with_config(explicit);
    request.module = args.module.clone();
    let pipeline = Pipeline::new(registry, Arc::new(FsStorage::new(&args.db_root)));

    // Ctrl-C → graceful shutdown.
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    match watch::watch_datasets(&pipeline, &request, &args.db_root, shutdown).await {
        Ok(()) => 0,
        Err(err) => fail(&err, &codes),
    }
}

fn print_tasks(registry: &TaskRegistry) {
    println!("registered tasks ({}):", registry.specs().count());
    for spec in registry.specs() {
        let source = if spec.source { ", source" } else { "" };
        println!("  - {} [{}] ({}{source})", spec.name, spec.module, spec.kind);
        for param in spec.schema.specs() {
            let default = match &param.default {
                Some(value) => format!(" = {value}"),
                None => " (required)".to_string(),
            };
            let flag = if param.significant { "" } else { ", not in identity" };
            println!("      {}: {}{default}{flag}", param.name, param.ty);
        }
    }
    let versions: Vec<String> = registry
        .libraries()
        .iter()
        .map(|(name, version)| format!("{name} {version}"))
        .collect();
    println!("libraries: {}", versions.join(", "));
}
