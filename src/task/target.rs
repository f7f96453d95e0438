// src/task/target.rs

//! Output collection handles.

use tracing::debug;

use crate::errors::{Result, ScandagError};
use crate::storage::{Collection, Dataset};

/// A named output collection owned by a dataset.
///
/// Complete means the collection exists and holds at least one item; an
/// existing but empty collection is "created, not yet populated".
#[derive(Debug, Clone)]
pub struct Target {
    dataset: Dataset,
    name: String,
}

impl Target {
    pub fn new(dataset: &Dataset, name: impl Into<String>) -> Self {
        Self {
            dataset: dataset.clone(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.dataset.collection(&self.name)?.is_some())
    }

    /// Backing collection, created first when `create_if_missing` is set.
    /// Creation is idempotent.
    pub fn get(&self, create_if_missing: bool) -> Result<Option<Collection>> {
        match self.dataset.collection(&self.name)? {
            Some(collection) => Ok(Some(collection)),
            None if create_if_missing => {
                debug!(collection = %self.name, dataset = %self.dataset.id(), "creating target collection");
                Ok(Some(self.dataset.create_collection(&self.name)?))
            }
            None => Ok(None),
        }
    }

    pub fn item_count(&self) -> Result<usize> {
        match self.dataset.collection(&self.name)? {
            Some(collection) => collection.item_count(),
            None => Ok(0),
        }
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.item_count()? > 0)
    }

    /// Delete the collection with its items and metadata. Returns whether
    /// anything was removed.
    pub fn purge(&self) -> Result<bool> {
        if self.exists()? {
            self.dataset.delete_collection(&self.name)?;
            debug!(collection = %self.name, dataset = %self.dataset.id(), "purged target collection");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Find the collection `name` in `dataset`, or failing that the single
/// collection whose name starts with `prefix`. An empty prefix disables the
/// fallback. Several prefix matches are ambiguous and rejected.
pub fn find_collection(dataset: &Dataset, name: &str, prefix: &str) -> Result<Option<Collection>> {
    if !name.is_empty() {
        if let Some(collection) = dataset.collection(name)? {
            return Ok(Some(collection));
        }
    }
    if prefix.is_empty() {
        return Ok(None);
    }

    let mut matches: Vec<Collection> = dataset
        .collections()?
        .into_iter()
        .filter(|c| c.name().starts_with(prefix))
        .collect();
    match matches.len() {
        0 => Ok(None),
        1 => {
            let found = matches.remove(0);
            debug!(wanted = %name, found = %found.name(), "collection located by prefix");
            Ok(Some(found))
        }
        _ => Err(ScandagError::Precondition(format!(
            "several collections start with '{prefix}' in dataset '{}': {:?}",
            dataset.id(),
            matches.iter().map(Collection::name).collect::<Vec<_>>()
        ))),
    }
}
