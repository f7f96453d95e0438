// tests/failure_handling.rs

mod common;
use crate::common::{memory_pipeline, shared};

use std::error::Error;

use scandag::config::RetcodeSection;
use scandag::dag::NodeState;
use scandag::engine::TaskRequest;
use scandag::errors::ScandagError;
use scandag::storage::Session;
use scandag_test_utils::builders::{Fixtures, config, new_dataset, seed_images};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn failed_node_leaves_no_output_and_aborts_dependents() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("AfterBroken"), "plant_1")
        .await?;

    assert!(!report.is_success());
    assert_eq!(fixtures.executed(), vec!["Acquire", "Broken"]);

    let broken = report
        .nodes
        .iter()
        .find(|n| n.family == "Broken")
        .ok_or("no Broken node")?;
    assert_eq!(broken.state, NodeState::Failed);
    assert!(
        broken
            .error
            .as_deref()
            .is_some_and(|e| e.contains("broken on purpose"))
    );
    assert_eq!(report.aborted().len(), 1);

    let session = Session::open(shared(&storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    assert!(dataset.collection(&broken.id)?.is_none());

    // The independent upstream output is preserved.
    let acquire = report.executed()[0].to_string();
    assert!(dataset.collection(&acquire)?.is_some());
    drop(dataset);
    drop(session);

    match report.into_result() {
        Err(err @ ScandagError::TaskFailed { .. }) => {
            assert_eq!(err.retcode(&RetcodeSection::default()), RetcodeSection::default().task_failed);
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(storage.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn retries_rerun_a_failed_node_from_a_clean_output() -> TestResult {
    let fixtures = Fixtures::new().with_flaky_failures(2);
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let request = TaskRequest::new("Flaky").with_config(config(
        r#"
[scheduler]
retry_count = 2
retry_delay = 0
"#,
    ));
    let report = pipeline.execute_task(&request, "plant_1").await?.into_result()?;

    assert_eq!(fixtures.executed(), vec!["Flaky", "Flaky", "Flaky"]);
    assert_eq!(report.executed(), vec!["Flaky"]);

    let session = Session::open(shared(&storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    let output = dataset.collection("Flaky")?.ok_or("no output")?;
    assert!(output.item("partial")?.is_none());
    assert!(output.item("result")?.is_some());
    Ok(())
}

#[tokio::test]
async fn without_retries_a_failing_node_runs_once() -> TestResult {
    let fixtures = Fixtures::new().with_flaky_failures(1);
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Flaky"), "plant_1")
        .await?;

    assert_eq!(report.failed(), vec!["Flaky"]);
    assert_eq!(fixtures.executed(), vec!["Flaky"]);
    Ok(())
}

#[tokio::test]
async fn missing_images_is_a_precondition_failure() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "empty_scan")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Undistort"), "empty_scan")
        .await?;

    assert!(fixtures.executed().is_empty());
    assert_eq!(report.aborted().len(), 1);
    let err = report.into_result().expect_err("existence check must fail");
    assert!(matches!(err, ScandagError::Precondition(_)));
    assert_eq!(
        err.retcode(&RetcodeSection::default()),
        RetcodeSection::default().missing_data
    );
    Ok(())
}

#[tokio::test]
async fn existence_checks_always_rerun() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    seed_images(shared(&storage), "plant_1", 4)?;

    let request = TaskRequest::new("Undistort");
    let first = pipeline.execute_task(&request, "plant_1").await?.into_result()?;
    assert_eq!(first.executed().len(), 2);

    let second = pipeline.execute_task(&request, "plant_1").await?.into_result()?;
    let check = second
        .nodes
        .iter()
        .find(|n| n.family == "ImagesCollectionExists")
        .ok_or("no existence check")?;
    assert_eq!(check.state, NodeState::Done);
    assert_eq!(second.skipped().len(), 1);
    assert_eq!(fixtures.executed(), vec!["Undistort"]);
    Ok(())
}

#[tokio::test]
async fn pipeline_task_on_missing_dataset_fails_before_running() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);

    let err = pipeline
        .execute_task(&TaskRequest::new("Reconstruct"), "nowhere")
        .await
        .expect_err("dataset does not exist");

    assert!(matches!(err, ScandagError::Precondition(_)));
    assert!(fixtures.executed().is_empty());
    assert_eq!(storage.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn largest_retry_count_still_runs_a_passing_node_once() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;

    let request = TaskRequest::new("Flaky").with_config(config(&format!(
        "[scheduler]\nretry_count = {}\nretry_delay = 0\n",
        u32::MAX
    )));
    let report = pipeline.execute_task(&request, "plant_1").await?.into_result()?;

    assert_eq!(report.executed(), vec!["Flaky"]);
    assert_eq!(fixtures.executed(), vec!["Flaky"]);
    Ok(())
}
