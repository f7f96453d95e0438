// tests/cli.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use scandag::cli::{CliArgs, Command};
use scandag::run_with_registry;
use scandag::storage::{FsStorage, Storage};
use scandag::types::{PIPELINE_RECORD, SOURCE_RECORD};
use scandag_test_utils::builders::{Fixtures, new_dataset, seed_images};

type TestResult = Result<(), Box<dyn Error>>;

fn args(argv: &[&str]) -> CliArgs {
    let mut full = vec!["scandag"];
    full.extend_from_slice(argv);
    CliArgs::try_parse_from(full).expect("arguments must parse")
}

fn path(p: &Path) -> String {
    p.display().to_string()
}

fn fs_store(root: &Path) -> Arc<dyn Storage> {
    Arc::new(FsStorage::new(root))
}

#[test]
fn run_arguments_parse() {
    let parsed = args(&[
        "--log-level",
        "debug",
        "run",
        "Segment",
        "db/a",
        "db/b",
        "--module",
        "fixtures",
        "--dry-run",
    ]);
    assert!(parsed.log_level.is_some());
    match parsed.command {
        Command::Run(run) => {
            assert_eq!(run.task, "Segment");
            assert_eq!(run.datasets, vec!["db/a", "db/b"]);
            assert_eq!(run.module.as_deref(), Some("fixtures"));
            assert!(run.dry_run);
            assert!(run.config.is_none());
        }
        other => panic!("unexpected command {other:?}"),
    }

    assert!(CliArgs::try_parse_from(["scandag", "run", "Segment"]).is_err());
}

#[tokio::test]
async fn run_processes_every_matching_dataset() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    for id in ["plant_1", "plant_2"] {
        seed_images(fs_store(dir.path()), id, 2)?;
    }
    let fixtures = Fixtures::new();

    let pattern = path(&dir.path().join("plant_*"));
    let code = run_with_registry(args(&["run", "Undistort", &pattern]), fixtures.registry()).await;

    assert_eq!(code, 0);
    assert_eq!(fixtures.executed(), vec!["Undistort", "Undistort"]);
    for id in ["plant_1", "plant_2"] {
        assert!(dir.path().join(id).join(PIPELINE_RECORD).is_file());
    }
    Ok(())
}

#[tokio::test]
async fn exit_codes_follow_the_failure_kind() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    new_dataset(fs_store(dir.path()), "empty")?;
    let fixtures = Fixtures::new();
    let registry = fixtures.registry();

    let empty = path(&dir.path().join("empty"));
    let missing = path(&dir.path().join("missing"));

    // Existence check fails: missing data.
    assert_eq!(run_with_registry(args(&["run", "Undistort", &empty]), registry.clone()).await, 20);
    // Dataset does not exist: missing data.
    assert_eq!(run_with_registry(args(&["run", "Undistort", &missing]), registry.clone()).await, 20);
    // A node raised: task failed.
    assert_eq!(run_with_registry(args(&["run", "AfterBroken", &empty]), registry.clone()).await, 30);
    // Unknown task: scheduling error.
    assert_eq!(run_with_registry(args(&["run", "Nope", &empty]), registry.clone()).await, 35);
    // Source tasks take exactly one dataset.
    assert_eq!(
        run_with_registry(args(&["run", "Acquire", &empty, &missing]), registry.clone()).await,
        35
    );
    Ok(())
}

#[tokio::test]
async fn retcodes_come_from_the_explicit_configuration() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("codes.toml");
    std::fs::write(&config, "[retcode]\nmissing_data = 99\n")?;
    let missing = path(&dir.path().join("db").join("missing"));
    std::fs::create_dir(dir.path().join("db"))?;

    let code = run_with_registry(
        args(&["run", "Undistort", &missing, "--config", &path(&config)]),
        Fixtures::new().registry(),
    )
    .await;
    assert_eq!(code, 99);
    Ok(())
}

#[tokio::test]
async fn source_run_creates_the_dataset() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let fixtures = Fixtures::new();
    let target = dir.path().join("fresh_scan");

    let code = run_with_registry(args(&["run", "Acquire", &path(&target)]), fixtures.registry()).await;

    assert_eq!(code, 0);
    assert!(target.join(SOURCE_RECORD).is_file());
    assert_eq!(fixtures.executed(), vec!["Acquire"]);
    Ok(())
}

#[tokio::test]
async fn dry_run_touches_nothing() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    new_dataset(fs_store(dir.path()), "plant_1")?;
    let fixtures = Fixtures::new();
    let dataset = path(&dir.path().join("plant_1"));

    let code = run_with_registry(
        args(&["run", "Reconstruct", &dataset, "--dry-run"]),
        fixtures.registry(),
    )
    .await;

    assert_eq!(code, 0);
    assert!(fixtures.executed().is_empty());
    let entries: Vec<_> = std::fs::read_dir(dir.path().join("plant_1"))?.collect();
    assert!(entries.is_empty());
    Ok(())
}

#[tokio::test]
async fn task_listing_succeeds() {
    init_tracing();
    let code = run_with_registry(args(&["tasks"]), Fixtures::new().registry()).await;
    assert_eq!(code, 0);
}
