// tests/fs_storage.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use scandag::engine::{Pipeline, TaskRequest};
use scandag::errors::ScandagError;
use scandag::storage::fsdb::{LOCK_FILE, METADATA_DIR, split_dataset_path};
use scandag::storage::{FsStorage, Metadata, Session, Storage};
use scandag::types::PIPELINE_RECORD;
use scandag_test_utils::builders::{Fixtures, metadata, new_dataset};

type TestResult = Result<(), Box<dyn Error>>;

fn fs_store(dir: &TempDir) -> Arc<dyn Storage> {
    init_tracing();
    Arc::new(FsStorage::new(dir.path()))
}

#[tokio::test]
async fn chain_lays_out_collections_items_and_metadata_on_disk() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = fs_store(&dir);
    new_dataset(storage.clone(), "plant_1")?;

    let fixtures = Fixtures::new();
    let pipeline = Pipeline::new(fixtures.registry(), storage.clone());
    let report = pipeline
        .execute_task(&TaskRequest::new("Reconstruct"), "plant_1")
        .await?
        .into_result()?;

    let root = dir.path().join("plant_1");
    for id in report.executed() {
        assert!(root.join(id).is_dir(), "{id} directory missing");
        assert!(
            root.join(METADATA_DIR).join(format!("{id}.json")).is_file(),
            "{id} has no stamped metadata"
        );
    }
    let reconstruct = report.executed()[2];
    assert!(root.join(reconstruct).join("model").is_file());
    assert!(
        root.join(METADATA_DIR)
            .join(reconstruct)
            .join("model.json")
            .is_file()
    );
    assert!(root.join(PIPELINE_RECORD).is_file());
    assert!(!dir.path().join(LOCK_FILE).exists(), "lock must be released");

    // Rerun on disk is a no-op as well.
    let rerun = pipeline
        .execute_task(&TaskRequest::new("Reconstruct"), "plant_1")
        .await?
        .into_result()?;
    assert!(rerun.executed().is_empty());
    assert_eq!(fixtures.executed().len(), 3);
    Ok(())
}

#[test]
fn held_lock_reports_busy() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = fs_store(&dir);
    std::fs::write(dir.path().join(LOCK_FILE), b"")?;

    let err = Session::open(storage.clone()).expect_err("lock is held");
    assert!(matches!(err, ScandagError::StorageBusy(_)));
    assert!(err.is_busy());

    std::fs::remove_file(dir.path().join(LOCK_FILE))?;
    let session = Session::open(storage)?;
    assert!(dir.path().join(LOCK_FILE).is_file());
    drop(session);
    assert!(!dir.path().join(LOCK_FILE).exists());
    Ok(())
}

#[test]
fn sessions_in_one_process_share_the_lock() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = fs_store(&dir);

    let first = Session::open(storage.clone())?;
    let second = Session::open(storage.clone())?;
    drop(first);
    assert!(dir.path().join(LOCK_FILE).is_file());
    drop(second);
    assert!(!dir.path().join(LOCK_FILE).exists());
    Ok(())
}

#[test]
fn query_filters_items_by_metadata() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = fs_store(&dir);
    let session = Session::open(storage)?;
    let dataset = session.create_dataset("plant_1")?;
    let images = dataset.create_collection("images")?;
    for (id, channel) in [("a", "rgb"), ("b", "mask"), ("c", "rgb")] {
        images
            .create_item(id)?
            .set_metadata(&metadata(&[("channel", json!(channel))]))?;
    }

    let rgb: Vec<String> = images
        .items(&metadata(&[("channel", json!("rgb"))]))?
        .iter()
        .map(|i| i.id().to_string())
        .collect();
    assert_eq!(rgb, vec!["a", "c"]);
    assert_eq!(images.items(&Metadata::new())?.len(), 3);
    assert!(images.items(&metadata(&[("channel", json!("depth"))]))?.is_empty());
    Ok(())
}

#[test]
fn metadata_set_merges_and_replace_overwrites() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = fs_store(&dir);
    let session = Session::open(storage)?;
    let item = session
        .create_dataset("plant_1")?
        .create_collection("images")?
        .create_item("img_000")?;

    item.set_metadata(&metadata(&[("pose", json!([1, 2, 3])), ("exposure", json!(0.5))]))?;
    item.set_metadata(&metadata(&[("exposure", json!(0.8))]))?;
    let merged = item.metadata()?;
    assert_eq!(merged["pose"], json!([1, 2, 3]));
    assert_eq!(merged["exposure"], json!(0.8));

    item.replace_metadata(&metadata(&[("camera", json!("cam0"))]))?;
    let replaced = item.metadata()?;
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced["camera"], json!("cam0"));
    Ok(())
}

#[test]
fn invalid_ids_are_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = fs_store(&dir);
    let session = Session::open(storage)?;
    let dataset = session.create_dataset("plant_1")?;

    for bad in ["", ".hidden", "a/b", METADATA_DIR] {
        assert!(
            matches!(dataset.create_collection(bad), Err(ScandagError::Storage(_))),
            "collection id {bad:?} accepted"
        );
    }
    Ok(())
}

#[test]
fn dataset_paths_split_into_root_and_id() -> TestResult {
    let (root, id) = split_dataset_path(Path::new("/data/db/plant_1"))?;
    assert_eq!(root, Path::new("/data/db"));
    assert_eq!(id, "plant_1");

    let (root, id) = split_dataset_path(Path::new("plant_2"))?;
    assert_eq!(root, Path::new("."));
    assert_eq!(id, "plant_2");
    Ok(())
}

#[tokio::test]
async fn dry_run_never_touches_the_lock() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = fs_store(&dir);
    new_dataset(storage.clone(), "plant_1")?;
    let lock = dir.path().join(LOCK_FILE);
    std::fs::write(&lock, b"held elsewhere")?;

    let fixtures = Fixtures::new();
    let pipeline = Pipeline::new(fixtures.registry(), storage.clone());
    let plan = pipeline.plan(&TaskRequest::new("Reconstruct"), "plant_1")?;
    assert_eq!(plan.to_run().len(), 3);

    // The foreign lock is neither refused nor released.
    assert_eq!(std::fs::read(&lock)?, b"held elsewhere");
    std::fs::remove_file(&lock)?;

    pipeline.plan(&TaskRequest::new("Reconstruct"), "plant_1")?;
    assert!(!lock.exists(), "a dry run must not create the lock");
    assert!(std::fs::read_dir(dir.path().join("plant_1"))?.next().is_none());
    Ok(())
}
