// tests/pipeline_chain.rs

mod common;
use crate::common::{memory_pipeline, shared};

use std::error::Error;

use serde_json::json;

use scandag::engine::TaskRequest;
use scandag::storage::Session;
use scandag::task::TASK_PARAMS_KEY;
use scandag::types::{PIPELINE_RECORD, SOURCE_RECORD, TaskKind};
use scandag_test_utils::builders::{ACQUIRED_ITEMS, Fixtures, new_dataset};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn chain_runs_upstream_first_and_rerun_does_nothing() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let request = TaskRequest::new("Reconstruct");
    let report = pipeline.execute_task(&request, "plant_1").await?;

    assert!(report.is_success(), "report: {report:?}");
    assert_eq!(fixtures.executed(), vec!["Acquire", "Segment", "Reconstruct"]);
    assert_eq!(report.executed().len(), 3);

    // Each producer wrote a populated collection named after its identity.
    let session = Session::open(shared(&storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    for id in report.executed() {
        let collection = dataset
            .collection(id)?
            .ok_or_else(|| format!("collection {id} missing"))?;
        assert!(collection.item_count()? > 0, "{id} is empty");
    }
    drop(dataset);
    drop(session);

    // Second run: everything is complete, nothing runs, nothing is written.
    let writes_before = storage.data_writes();
    let rerun = pipeline.execute_task(&request, "plant_1").await?;

    assert!(rerun.is_success());
    assert!(rerun.executed().is_empty());
    assert_eq!(rerun.skipped().len(), 3);
    assert_eq!(fixtures.executed().len(), 3);
    assert_eq!(storage.data_writes(), writes_before);
    assert_eq!(storage.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn file_by_file_applies_the_query_and_merges_metadata() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Segment"), "plant_1")
        .await?;
    let segment = report
        .nodes
        .iter()
        .find(|n| n.family == "Segment")
        .ok_or("no Segment node")?;

    let session = Session::open(shared(&storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    let output = dataset.collection(&segment.id)?.ok_or("no output")?;

    let items = output.items(&Default::default())?;
    assert_eq!(items.len(), ACQUIRED_ITEMS / 2);
    for item in &items {
        let metadata = item.metadata()?;
        assert_eq!(metadata["channel"], json!("rgb"));
        assert_eq!(metadata["segmented"], json!(true));
        assert!(metadata.contains_key("shot_id"));
    }

    let stamped = output.metadata()?;
    assert_eq!(
        stamped[TASK_PARAMS_KEY]["query"],
        json!({ "channel": "rgb" })
    );
    assert_eq!(stamped[TASK_PARAMS_KEY]["upstream_task"], json!("Acquire"));
    Ok(())
}

#[tokio::test]
async fn pipeline_run_writes_the_pipeline_record() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    pipeline
        .execute_task(&TaskRequest::new("Reconstruct"), "plant_1")
        .await?
        .into_result()?;

    let session = Session::open(shared(&storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    assert!(dataset.read_document(SOURCE_RECORD)?.is_none());

    let record: toml::Table = toml::from_str(
        &dataset
            .read_document(PIPELINE_RECORD)?
            .ok_or("no pipeline record")?,
    )?;
    assert_eq!(record["Segment"]["upstream_task"].as_str(), Some("Acquire"));
    assert_eq!(record["Reconstruct"]["upstream_task"].as_str(), Some("Segment"));
    assert_eq!(record["scheduler"]["retry_count"].as_integer(), Some(0));
    assert_eq!(record["worker"]["dataset_concurrency"].as_integer(), Some(1));
    assert!(record["retcode"].get("task_failed").is_some());
    assert_eq!(
        record["version"]["scandag"].as_str(),
        Some(env!("CARGO_PKG_VERSION"))
    );
    assert_eq!(record["version"]["fixtures"].as_str(), Some("0.0.1"));
    Ok(())
}

#[tokio::test]
async fn source_task_creates_a_missing_dataset_and_writes_the_source_record() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);

    let report = pipeline
        .execute_task(&TaskRequest::new("Acquire"), "new_scan")
        .await?
        .into_result()?;
    assert_eq!(report.executed(), vec!["Acquire"]);

    let session = Session::open(shared(&storage))?;
    let dataset = session.dataset("new_scan")?.ok_or("dataset not created")?;
    assert!(dataset.read_document(SOURCE_RECORD)?.is_some());
    assert!(dataset.read_document(PIPELINE_RECORD)?.is_none());
    Ok(())
}

#[tokio::test]
async fn diamond_runs_the_shared_upstream_once() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Merge"), "plant_1")
        .await?
        .into_result()?;

    let executed = fixtures.executed();
    assert_eq!(executed.iter().filter(|f| *f == "Acquire").count(), 1);
    assert_eq!(executed.len(), 4);
    assert_eq!(executed.first().map(String::as_str), Some("Acquire"));
    assert_eq!(executed.last().map(String::as_str), Some("Merge"));
    assert_eq!(report.nodes.len(), 4);
    Ok(())
}

#[tokio::test]
async fn dry_run_plan_writes_nothing() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let request = TaskRequest::new("Reconstruct");
    let plan = pipeline.plan(&request, "plant_1")?;

    assert_eq!(plan.steps.len(), 3);
    assert_eq!(plan.to_run().len(), 3);
    assert!(plan.steps.iter().all(|s| s.kind == TaskKind::Producer));
    assert!(fixtures.executed().is_empty());
    assert_eq!(storage.data_writes(), 0);

    let session = Session::open(shared(&storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    assert!(dataset.collections()?.is_empty());
    assert!(dataset.documents()?.is_empty());
    drop(dataset);
    drop(session);

    pipeline.execute_task(&request, "plant_1").await?;
    let replanned = pipeline.plan(&request, "plant_1")?;
    assert!(replanned.to_run().is_empty());
    assert!(replanned.to_string().contains("skip (complete)"));
    Ok(())
}

#[tokio::test]
async fn module_selection_is_enforced() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let wrong = TaskRequest::new("Segment").with_module("acquisition");
    let err = pipeline
        .execute_task(&wrong, "plant_1")
        .await
        .expect_err("module mismatch must fail");
    assert!(matches!(err, scandag::errors::ScandagError::UnregisteredTask(_)));

    let right = TaskRequest::new("Segment").with_module("fixtures");
    assert!(pipeline.execute_task(&right, "plant_1").await?.is_success());
    Ok(())
}

#[tokio::test]
async fn empty_output_collection_does_not_count_as_complete() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;
    {
        let session = Session::open(shared(&storage))?;
        let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
        dataset.create_collection("Flaky")?;
    }

    let report = pipeline
        .execute_task(&TaskRequest::new("Flaky"), "plant_1")
        .await?
        .into_result()?;

    assert_eq!(report.executed(), vec!["Flaky"]);
    assert!(report.skipped().is_empty());
    assert_eq!(fixtures.executed(), vec!["Flaky"]);
    Ok(())
}
