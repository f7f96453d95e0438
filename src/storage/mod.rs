// src/storage/mod.rs

//! Dataset store abstraction.
//!
//! The engine never talks to a concrete database. Everything goes through the
//! [`Storage`] trait, keyed by plain ids:
//!
//! - a *dataset* is the top-level container (one per acquisition),
//! - a *collection* is a named group of items inside a dataset,
//! - an *item* is a single stored artifact with attached metadata,
//! - a *document* is a small text file at the dataset root (backup records,
//!   local configuration overrides).
//!
//! [`Session`] wraps a connected store and hands out the [`Dataset`],
//! [`Collection`] and [`Item`] handles used by tasks.
//!
//! - [`memory`] is an in-process implementation (tests, embedding).
//! - [`fsdb`] is the filesystem-backed database used by the CLI.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;

use serde_json::Value;

use crate::errors::Result;

pub mod fsdb;
pub mod memory;
pub mod session;

pub use fsdb::FsStorage;
pub use memory::MemoryStorage;
pub use session::{Collection, Dataset, Item, Session};

/// Key/value metadata attached to collections and items.
pub type Metadata = BTreeMap<String, Value>;

/// Name of the collection holding the raw acquisition images.
pub const IMAGES_COLLECTION: &str = "images";

/// Abstract dataset store.
///
/// Implementations must make `create_*` calls idempotent and
/// `delete_collection` remove every contained item together with its
/// metadata.
pub trait Storage: Send + Sync + Debug {
    /// Open the store for a session. May fail with `StorageBusy`.
    fn connect(&self) -> Result<()>;
    /// Release what `connect` acquired.
    fn disconnect(&self) -> Result<()>;

    /// Open the store for inspection only. Writes nothing, not even a lock.
    fn connect_read_only(&self) -> Result<()> {
        Ok(())
    }
    /// Release what `connect_read_only` acquired.
    fn disconnect_read_only(&self) -> Result<()> {
        Ok(())
    }

    fn dataset_exists(&self, dataset: &str) -> Result<bool>;
    fn create_dataset(&self, dataset: &str) -> Result<()>;
    fn list_datasets(&self) -> Result<Vec<String>>;
    /// Filesystem location of the dataset, if the store has one.
    fn dataset_path(&self, dataset: &str) -> Option<PathBuf>;

    fn list_collections(&self, dataset: &str) -> Result<Vec<String>>;
    fn collection_exists(&self, dataset: &str, collection: &str) -> Result<bool>;
    fn create_collection(&self, dataset: &str, collection: &str) -> Result<()>;
    fn delete_collection(&self, dataset: &str, collection: &str) -> Result<()>;
    fn collection_metadata(&self, dataset: &str, collection: &str) -> Result<Metadata>;
    /// Merge `metadata` into the collection metadata (given keys win).
    fn set_collection_metadata(
        &self,
        dataset: &str,
        collection: &str,
        metadata: &Metadata,
    ) -> Result<()>;

    fn list_items(&self, dataset: &str, collection: &str) -> Result<Vec<String>>;
    fn item_exists(&self, dataset: &str, collection: &str, item: &str) -> Result<bool>;
    fn create_item(&self, dataset: &str, collection: &str, item: &str) -> Result<()>;
    fn read_item(&self, dataset: &str, collection: &str, item: &str) -> Result<Vec<u8>>;
    fn write_item(&self, dataset: &str, collection: &str, item: &str, data: &[u8]) -> Result<()>;
    fn item_metadata(&self, dataset: &str, collection: &str, item: &str) -> Result<Metadata>;
    /// Merge `metadata` into the item metadata (given keys win).
    fn set_item_metadata(
        &self,
        dataset: &str,
        collection: &str,
        item: &str,
        metadata: &Metadata,
    ) -> Result<()>;
    /// Replace the whole item metadata with `metadata`.
    fn replace_item_metadata(
        &self,
        dataset: &str,
        collection: &str,
        item: &str,
        metadata: &Metadata,
    ) -> Result<()>;

    fn read_document(&self, dataset: &str, name: &str) -> Result<Option<String>>;
    fn write_document(&self, dataset: &str, name: &str, contents: &str) -> Result<()>;
    /// Returns `true` if a document was removed.
    fn delete_document(&self, dataset: &str, name: &str) -> Result<bool>;
    fn list_documents(&self, dataset: &str) -> Result<Vec<String>>;

    /// Remove metadata documents left behind by collections that no longer
    /// exist. Returns the names of the pruned entries.
    fn prune_metadata(&self, _dataset: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Whether `metadata` satisfies a filter query: every query key must be
/// present with an equal value. The empty query matches everything.
pub fn matches_query(metadata: &Metadata, query: &Metadata) -> bool {
    query
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

/// Reject ids that cannot be used as path components or clash with the
/// reserved `metadata` area.
pub(crate) fn validate_id(kind: &str, id: &str) -> Result<()> {
    use crate::errors::ScandagError;

    if id.is_empty()
        || id.starts_with('.')
        || id.contains('/')
        || id.contains('\\')
        || id == fsdb::METADATA_DIR
    {
        return Err(ScandagError::Storage(format!("invalid {kind} id '{id}'")));
    }
    Ok(())
}
