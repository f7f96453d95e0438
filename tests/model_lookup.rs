// tests/model_lookup.rs

mod common;
use crate::common::{memory_pipeline, shared};

use std::error::Error;

use scandag::engine::{RunReport, TaskRequest};
use scandag::errors::ScandagError;
use scandag::storage::{MemoryStorage, Session};
use scandag_test_utils::builders::{Fixtures, config, new_dataset};

type TestResult = Result<(), Box<dyn Error>>;

/// Add `collection` holding one `item` to `plant_1`.
fn add_model(storage: &MemoryStorage, collection: &str, item: &str) -> TestResult {
    let session = Session::open(shared(storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    dataset.create_collection(collection)?.create_item(item)?.write(b"obj")?;
    Ok(())
}

/// Name of the model collection `Render` read, from its output metadata.
fn rendered_from(storage: &MemoryStorage, report: &RunReport) -> Result<String, Box<dyn Error>> {
    let render = report
        .nodes
        .iter()
        .find(|n| n.family == "Render")
        .ok_or("no Render node")?;
    let session = Session::open(shared(storage))?;
    let dataset = session.dataset("plant_1")?.ok_or("dataset missing")?;
    let item = dataset
        .collection(&render.id)?
        .ok_or("no Render output")?
        .item("render")?
        .ok_or("no render item")?;
    let model = item.metadata()?["model"].clone();
    Ok(model.as_str().ok_or("model is not a string")?.to_string())
}

#[tokio::test]
async fn exact_collection_name_wins_over_prefixed_ones() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;
    add_model(&storage, "VirtualPlant", "VirtualPlant")?;
    add_model(&storage, "VirtualPlant_old", "VirtualPlant")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Render"), "plant_1")
        .await?
        .into_result()?;

    assert_eq!(rendered_from(&storage, &report)?, "VirtualPlant");
    Ok(())
}

#[tokio::test]
async fn single_prefixed_collection_is_used_when_the_name_is_absent() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;
    add_model(&storage, "VirtualPlant_arabidopsis", "VirtualPlant")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Render"), "plant_1")
        .await?
        .into_result()?;

    assert_eq!(rendered_from(&storage, &report)?, "VirtualPlant_arabidopsis");
    assert_eq!(fixtures.executed(), vec!["Render"]);
    Ok(())
}

#[tokio::test]
async fn no_matching_collection_is_a_precondition_failure() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;
    add_model(&storage, "Mesh_1", "VirtualPlant")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Render"), "plant_1")
        .await?;

    assert!(fixtures.executed().is_empty());
    assert!(matches!(report.into_result(), Err(ScandagError::Precondition(_))));
    Ok(())
}

#[tokio::test]
async fn several_prefixed_collections_are_ambiguous() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;
    add_model(&storage, "VirtualPlant_a", "VirtualPlant")?;
    add_model(&storage, "VirtualPlant_b", "VirtualPlant")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Render"), "plant_1")
        .await?;

    assert!(fixtures.executed().is_empty());
    let check = report
        .nodes
        .iter()
        .find(|n| n.family == "VirtualPlantObj")
        .ok_or("no existence check")?;
    assert!(
        check
            .error
            .as_deref()
            .is_some_and(|e| e.contains("several collections"))
    );
    assert!(matches!(report.into_result(), Err(ScandagError::Precondition(_))));
    Ok(())
}

#[tokio::test]
async fn located_collection_must_hold_the_item() -> TestResult {
    let fixtures = Fixtures::new();
    let (storage, pipeline) = memory_pipeline(&fixtures);
    new_dataset(shared(&storage), "plant_1")?;
    add_model(&storage, "VirtualPlant_1", "other")?;

    let report = pipeline
        .execute_task(&TaskRequest::new("Render"), "plant_1")
        .await?;
    assert!(matches!(report.into_result(), Err(ScandagError::Precondition(_))));

    // Configured names replace the defaults.
    let request = TaskRequest::new("Render").with_config(config(
        r#"
[VirtualPlantObj]
collection = "Models"
collection_prefix = "VirtualPlant"
item = "other"
"#,
    ));
    let report = pipeline.execute_task(&request, "plant_1").await?.into_result()?;
    assert_eq!(rendered_from(&storage, &report)?, "VirtualPlant_1");
    Ok(())
}
