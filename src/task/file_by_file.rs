// src/task/file_by_file.rs

//! Per-item transform logic.

use tracing::debug;

use crate::storage::{Collection, Item, Metadata};
use crate::task::{TaskContext, TaskLogic};

/// Name of the dict parameter restricting which upstream items are consumed.
pub const QUERY_PARAM: &str = "query";

/// Applies a transform to every item of the first upstream collection that
/// matches the node's `query` parameter.
///
/// The transform receives the input item and the output collection and
/// returns the item it wrote, or `None` to skip. Metadata of the input item
/// is copied onto the written item underneath the keys the transform set
/// itself; on conflict the transform's value wins.
pub struct FileByFile<F> {
    transform: F,
}

impl<F> FileByFile<F>
where
    F: Fn(&Item, &Collection) -> anyhow::Result<Option<Item>> + Send + Sync,
{
    pub fn new(transform: F) -> Self {
        Self { transform }
    }
}

impl<F> TaskLogic for FileByFile<F>
where
    F: Fn(&Item, &Collection) -> anyhow::Result<Option<Item>> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        let input = ctx.input(0)?;
        let output = ctx.output()?;
        let query = ctx.params().query(QUERY_PARAM);

        let items = input.items(&query)?;
        debug!(
            task = %ctx.node().id(),
            input = %input.name(),
            count = items.len(),
            ?query,
            "selected input items"
        );

        for item in &items {
            let Some(written) = (self.transform)(item, output)? else {
                continue;
            };
            let merged = merge_metadata(item.metadata()?, written.metadata()?, written.id());
            written.replace_metadata(&merged)?;
        }
        Ok(())
    }
}

/// Upstream metadata first, then the transform's own keys on top.
fn merge_metadata(upstream: Metadata, own: Metadata, item: &str) -> Metadata {
    let shadowed: Vec<&String> = own
        .iter()
        .filter(|(key, value)| upstream.get(*key).is_some_and(|up| up != *value))
        .map(|(key, _)| key)
        .collect();
    if !shadowed.is_empty() {
        debug!(item = %item, keys = ?shadowed, "transform metadata overrides upstream values");
    }

    let mut merged = upstream;
    merged.extend(own);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transform_keys_win_over_upstream() {
        let upstream: Metadata = [("channel".to_string(), json!("rgb")), ("pose".to_string(), json!([1, 2]))]
            .into_iter()
            .collect();
        let own: Metadata = [("channel".to_string(), json!("mask"))].into_iter().collect();

        let merged = merge_metadata(upstream, own, "img_000");
        assert_eq!(merged["channel"], json!("mask"));
        assert_eq!(merged["pose"], json!([1, 2]));
    }
}
