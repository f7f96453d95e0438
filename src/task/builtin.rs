// src/task/builtin.rs

//! Tasks shipped with the engine.
//!
//! Existence checks assert that data produced outside the pipeline is there.
//! `Clean` resets a dataset to its acquired images. `Dummy` does nothing.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::bail;
use dialoguer::Confirm;
use tracing::{error, info, warn};

use crate::storage::{IMAGES_COLLECTION, Metadata};
use crate::task::params::{ParamSpec, ParamType};
use crate::task::registry::{TaskRegistry, TaskSpec};
use crate::task::target::find_collection;
use crate::task::{TaskContext, TaskLogic};
use crate::types::{PIPELINE_RECORD, TaskKind};

/// Module the built-in tasks are registered under.
pub const MODULE: &str = "builtin";

/// Image metadata written at acquisition time; `Clean` never strips it.
pub const PROTECTED_METADATA: [&str; 5] = ["pose", "approximate_pose", "channel", "shot_id", "camera"];

/// Collections with this prefix hold externally generated data and survive
/// `Clean`.
pub const PROTECTED_PREFIX: &str = "VirtualPlant";

/// Register every built-in task into `registry`.
pub fn register(registry: &mut TaskRegistry) {
    registry
        .register(
            TaskSpec::new("DatasetExists", MODULE, TaskKind::ExistenceCheck, |_| {
                Ok(Arc::new(DatasetExists) as Arc<dyn TaskLogic>)
            })
            .param(ParamSpec::string("dataset", "")),
        )
        .register(
            TaskSpec::new("CollectionExists", MODULE, TaskKind::ExistenceCheck, |_| {
                Ok(Arc::new(CollectionExists) as Arc<dyn TaskLogic>)
            })
            .param(ParamSpec::required("collection", ParamType::Str)),
        )
        .register(
            TaskSpec::new(
                "ImagesCollectionExists",
                MODULE,
                TaskKind::ExistenceCheck,
                |_| Ok(Arc::new(CollectionExists) as Arc<dyn TaskLogic>),
            )
            .param(ParamSpec::string("collection", IMAGES_COLLECTION)),
        )
        .register(
            TaskSpec::new("ItemExists", MODULE, TaskKind::ExistenceCheck, |_| {
                Ok(Arc::new(ItemExists) as Arc<dyn TaskLogic>)
            })
            .param(ParamSpec::required("collection", ParamType::Str))
            .param(ParamSpec::required("item", ParamType::Str)),
        )
        .register(
            TaskSpec::new("VirtualPlantObj", MODULE, TaskKind::ExistenceCheck, |_| {
                Ok(Arc::new(PrefixedItemExists) as Arc<dyn TaskLogic>)
            })
            .param(ParamSpec::string("collection", PROTECTED_PREFIX))
            .param(ParamSpec::string("collection_prefix", PROTECTED_PREFIX))
            .param(ParamSpec::string("item", PROTECTED_PREFIX)),
        )
        .register(
            TaskSpec::new("Clean", MODULE, TaskKind::SideEffect, |_| {
                Ok(Arc::new(Clean) as Arc<dyn TaskLogic>)
            })
            .param(ParamSpec::bool("no_confirm", false).insignificant())
            .param(ParamSpec::list("keep_metadata", Vec::new()))
            .without_record(),
        )
        .register(TaskSpec::new("Dummy", MODULE, TaskKind::SideEffect, |_| {
            Ok(Arc::new(Dummy) as Arc<dyn TaskLogic>)
        }));
}

/// Fails unless the dataset exists (the current one when `dataset` is empty).
pub struct DatasetExists;

impl TaskLogic for DatasetExists {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        let wanted = match ctx.params().str("dataset") {
            Some(id) if !id.is_empty() => id,
            _ => ctx.dataset().id(),
        };
        if ctx.dataset().session().dataset(wanted)?.is_none() {
            bail!("dataset '{wanted}' does not exist");
        }
        Ok(())
    }
}

/// Fails unless the `collection` parameter names an existing collection.
pub struct CollectionExists;

impl TaskLogic for CollectionExists {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        let name = ctx.params().str("collection").unwrap_or_default();
        if ctx.dataset().collection(name)?.is_none() {
            bail!("collection '{name}' does not exist in dataset '{}'", ctx.dataset().id());
        }
        Ok(())
    }
}

/// Fails unless `collection` exists and holds `item`.
pub struct ItemExists;

impl TaskLogic for ItemExists {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        let name = ctx.params().str("collection").unwrap_or_default();
        let item = ctx.params().str("item").unwrap_or_default();
        let Some(collection) = ctx.dataset().collection(name)? else {
            bail!("collection '{name}' does not exist in dataset '{}'", ctx.dataset().id());
        };
        if collection.item(item)?.is_none() {
            bail!("item '{name}/{item}' does not exist");
        }
        Ok(())
    }
}

/// Fails unless `item` exists in `collection`, or in the only collection
/// starting with `collection_prefix` when `collection` is absent.
///
/// Used for externally generated plant models, whose collection names often
/// carry a suffix.
pub struct PrefixedItemExists;

impl TaskLogic for PrefixedItemExists {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        let name = ctx.params().str("collection").unwrap_or_default();
        let prefix = ctx.params().str("collection_prefix").unwrap_or_default();
        let item = ctx.params().str("item").unwrap_or_default();

        let Some(collection) = find_collection(ctx.dataset(), name, prefix)? else {
            bail!(
                "neither collection '{name}' nor one starting with '{prefix}' exists in dataset '{}'",
                ctx.dataset().id()
            );
        };
        if collection.item(item)?.is_none() {
            bail!("item '{}/{item}' does not exist", collection.name());
        }
        info!(collection = %collection.name(), item = %item, "found model item");
        Ok(())
    }
}

/// Remove every derived collection and strip image metadata back to the
/// acquisition keys.
pub struct Clean;

impl Clean {
    fn confirmed(no_confirm: bool) -> anyhow::Result<bool> {
        if no_confirm {
            return Ok(true);
        }
        warn!("this will delete all collections and metadata except the '{IMAGES_COLLECTION}' collection");
        let answer = Confirm::new()
            .with_prompt("Confirm?")
            .default(false)
            .interact()?;
        Ok(answer)
    }
}

impl TaskLogic for Clean {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        let dataset = ctx.dataset();
        info!(dataset = %dataset.id(), "cleaning dataset");

        let no_confirm = ctx.params().bool("no_confirm").unwrap_or(false);
        if !Clean::confirmed(no_confirm)? {
            info!(dataset = %dataset.id(), "cleaning not confirmed; nothing deleted");
            return Ok(());
        }

        let mut keep: BTreeSet<String> = ctx.params().str_list("keep_metadata").into_iter().collect();
        keep.extend(PROTECTED_METADATA.iter().map(|k| k.to_string()));

        let doomed: Vec<String> = dataset
            .collections()?
            .into_iter()
            .map(|c| c.name().to_string())
            .filter(|name| name != IMAGES_COLLECTION && !name.starts_with(PROTECTED_PREFIX))
            .collect();
        info!(count = doomed.len(), "found collections to delete (excluding '{IMAGES_COLLECTION}')");
        for name in &doomed {
            info!(collection = %name, "deleting collection");
            dataset.delete_collection(name)?;
        }

        match dataset.collection(IMAGES_COLLECTION)? {
            None => error!(dataset = %dataset.id(), "no '{IMAGES_COLLECTION}' collection in dataset"),
            Some(images) => {
                info!("cleaning '{IMAGES_COLLECTION}' item metadata");
                for item in images.items(&Metadata::new())? {
                    let kept: Metadata = item
                        .metadata()?
                        .into_iter()
                        .filter(|(key, _)| keep.contains(key))
                        .collect();
                    item.replace_metadata(&kept)?;
                }
            }
        }

        let pruned = dataset.prune_metadata()?;
        if !pruned.is_empty() {
            info!(count = pruned.len(), "removed orphan metadata");
        }

        if dataset.delete_document(PIPELINE_RECORD)? {
            info!("deleted backup record '{PIPELINE_RECORD}'");
        } else {
            info!("no backup record '{PIPELINE_RECORD}' found");
        }
        Ok(())
    }
}

/// Requires nothing, does nothing.
pub struct Dummy;

impl TaskLogic for Dummy {
    fn run(&self, _ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}
