// src/storage/memory.rs

//! In-process [`Storage`] implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Metadata, Storage, validate_id};
use crate::errors::{Result, ScandagError};

#[derive(Debug, Clone, Default)]
struct MemoryItem {
    data: Vec<u8>,
    metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
struct MemoryCollection {
    metadata: Metadata,
    items: BTreeMap<String, MemoryItem>,
}

#[derive(Debug, Clone, Default)]
struct MemoryDataset {
    collections: BTreeMap<String, MemoryCollection>,
    documents: BTreeMap<String, String>,
}

/// Store keeping every dataset in memory.
///
/// Clones share the same underlying data, so a test can keep one clone for
/// assertions while the engine works on another. Besides the [`Storage`]
/// contract it exposes a few knobs for tests: a busy flag that makes
/// `connect` fail, and counters for open connections and data writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    datasets: Arc<Mutex<BTreeMap<String, MemoryDataset>>>,
    connections: Arc<AtomicUsize>,
    data_writes: Arc<AtomicUsize>,
    busy: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, `connect` fails with `StorageBusy`.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Number of sessions currently connected.
    pub fn open_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of mutating calls on collections and items so far.
    ///
    /// Documents (backup records, overrides) are not counted.
    pub fn data_writes(&self) -> usize {
        self.data_writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, MemoryDataset>>> {
        self.datasets
            .lock()
            .map_err(|_| ScandagError::Storage("memory store lock poisoned".to_string()))
    }

    fn record_write(&self) {
        self.data_writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn dataset_mut<'a>(
    datasets: &'a mut BTreeMap<String, MemoryDataset>,
    dataset: &str,
) -> Result<&'a mut MemoryDataset> {
    datasets
        .get_mut(dataset)
        .ok_or_else(|| ScandagError::Storage(format!("dataset '{dataset}' does not exist")))
}

fn dataset_ref<'a>(
    datasets: &'a BTreeMap<String, MemoryDataset>,
    dataset: &str,
) -> Result<&'a MemoryDataset> {
    datasets
        .get(dataset)
        .ok_or_else(|| ScandagError::Storage(format!("dataset '{dataset}' does not exist")))
}

fn collection_mut<'a>(
    datasets: &'a mut BTreeMap<String, MemoryDataset>,
    dataset: &str,
    collection: &str,
) -> Result<&'a mut MemoryCollection> {
    dataset_mut(datasets, dataset)?
        .collections
        .get_mut(collection)
        .ok_or_else(|| {
            ScandagError::Storage(format!(
                "collection '{dataset}/{collection}' does not exist"
            ))
        })
}

fn collection_ref<'a>(
    datasets: &'a BTreeMap<String, MemoryDataset>,
    dataset: &str,
    collection: &str,
) -> Result<&'a MemoryCollection> {
    dataset_ref(datasets, dataset)?
        .collections
        .get(collection)
        .ok_or_else(|| {
            ScandagError::Storage(format!(
                "collection '{dataset}/{collection}' does not exist"
            ))
        })
}

fn item_mut<'a>(
    datasets: &'a mut BTreeMap<String, MemoryDataset>,
    dataset: &str,
    collection: &str,
    item: &str,
) -> Result<&'a mut MemoryItem> {
    collection_mut(datasets, dataset, collection)?
        .items
        .get_mut(item)
        .ok_or_else(|| {
            ScandagError::Storage(format!(
                "item '{dataset}/{collection}/{item}' does not exist"
            ))
        })
}

fn item_ref<'a>(
    datasets: &'a BTreeMap<String, MemoryDataset>,
    dataset: &str,
    collection: &str,
    item: &str,
) -> Result<&'a MemoryItem> {
    collection_ref(datasets, dataset, collection)?
        .items
        .get(item)
        .ok_or_else(|| {
            ScandagError::Storage(format!(
                "item '{dataset}/{collection}/{item}' does not exist"
            ))
        })
}

impl Storage for MemoryStorage {
    fn connect(&self) -> Result<()> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(ScandagError::StorageBusy(
                "memory store is marked busy".to_string(),
            ));
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        // Saturate at zero; a stray disconnect must not wrap around.
        let _ = self
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        Ok(())
    }

    fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(dataset))
    }

    fn create_dataset(&self, dataset: &str) -> Result<()> {
        validate_id("dataset", dataset)?;
        self.lock()?.entry(dataset.to_string()).or_default();
        Ok(())
    }

    fn list_datasets(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn dataset_path(&self, _dataset: &str) -> Option<PathBuf> {
        None
    }

    fn list_collections(&self, dataset: &str) -> Result<Vec<String>> {
        let datasets = self.lock()?;
        Ok(dataset_ref(&datasets, dataset)?
            .collections
            .keys()
            .cloned()
            .collect())
    }

    fn collection_exists(&self, dataset: &str, collection: &str) -> Result<bool> {
        let datasets = self.lock()?;
        Ok(datasets
            .get(dataset)
            .is_some_and(|d| d.collections.contains_key(collection)))
    }

    fn create_collection(&self, dataset: &str, collection: &str) -> Result<()> {
        validate_id("collection", collection)?;
        let mut datasets = self.lock()?;
        let entry = dataset_mut(&mut datasets, dataset)?;
        if !entry.collections.contains_key(collection) {
            entry
                .collections
                .insert(collection.to_string(), MemoryCollection::default());
            self.record_write();
        }
        Ok(())
    }

    fn delete_collection(&self, dataset: &str, collection: &str) -> Result<()> {
        let mut datasets = self.lock()?;
        if dataset_mut(&mut datasets, dataset)?
            .collections
            .remove(collection)
            .is_some()
        {
            self.record_write();
        }
        Ok(())
    }

    fn collection_metadata(&self, dataset: &str, collection: &str) -> Result<Metadata> {
        let datasets = self.lock()?;
        Ok(collection_ref(&datasets, dataset, collection)?.metadata.clone())
    }

    fn set_collection_metadata(
        &self,
        dataset: &str,
        collection: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let mut datasets = self.lock()?;
        let entry = collection_mut(&mut datasets, dataset, collection)?;
        entry
            .metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.record_write();
        Ok(())
    }

    fn list_items(&self, dataset: &str, collection: &str) -> Result<Vec<String>> {
        let datasets = self.lock()?;
        Ok(collection_ref(&datasets, dataset, collection)?
            .items
            .keys()
            .cloned()
            .collect())
    }

    fn item_exists(&self, dataset: &str, collection: &str, item: &str) -> Result<bool> {
        let datasets = self.lock()?;
        Ok(datasets
            .get(dataset)
            .and_then(|d| d.collections.get(collection))
            .is_some_and(|c| c.items.contains_key(item)))
    }

    fn create_item(&self, dataset: &str, collection: &str, item: &str) -> Result<()> {
        validate_id("item", item)?;
        let mut datasets = self.lock()?;
        let entry = collection_mut(&mut datasets, dataset, collection)?;
        if !entry.items.contains_key(item) {
            entry.items.insert(item.to_string(), MemoryItem::default());
            self.record_write();
        }
        Ok(())
    }

    fn read_item(&self, dataset: &str, collection: &str, item: &str) -> Result<Vec<u8>> {
        let datasets = self.lock()?;
        Ok(item_ref(&datasets, dataset, collection, item)?.data.clone())
    }

    fn write_item(&self, dataset: &str, collection: &str, item: &str, data: &[u8]) -> Result<()> {
        let mut datasets = self.lock()?;
        item_mut(&mut datasets, dataset, collection, item)?.data = data.to_vec();
        self.record_write();
        Ok(())
    }

    fn item_metadata(&self, dataset: &str, collection: &str, item: &str) -> Result<Metadata> {
        let datasets = self.lock()?;
        Ok(item_ref(&datasets, dataset, collection, item)?.metadata.clone())
    }

    fn set_item_metadata(
        &self,
        dataset: &str,
        collection: &str,
        item: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let mut datasets = self.lock()?;
        item_mut(&mut datasets, dataset, collection, item)?
            .metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.record_write();
        Ok(())
    }

    fn replace_item_metadata(
        &self,
        dataset: &str,
        collection: &str,
        item: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let mut datasets = self.lock()?;
        item_mut(&mut datasets, dataset, collection, item)?.metadata = metadata.clone();
        self.record_write();
        Ok(())
    }

    fn read_document(&self, dataset: &str, name: &str) -> Result<Option<String>> {
        let datasets = self.lock()?;
        Ok(dataset_ref(&datasets, dataset)?.documents.get(name).cloned())
    }

    fn write_document(&self, dataset: &str, name: &str, contents: &str) -> Result<()> {
        validate_id("document", name)?;
        let mut datasets = self.lock()?;
        dataset_mut(&mut datasets, dataset)?
            .documents
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn delete_document(&self, dataset: &str, name: &str) -> Result<bool> {
        let mut datasets = self.lock()?;
        Ok(dataset_mut(&mut datasets, dataset)?
            .documents
            .remove(name)
            .is_some())
    }

    fn list_documents(&self, dataset: &str) -> Result<Vec<String>> {
        let datasets = self.lock()?;
        Ok(dataset_ref(&datasets, dataset)?
            .documents
            .keys()
            .cloned()
            .collect())
    }
}
