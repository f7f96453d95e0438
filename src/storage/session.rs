// src/storage/session.rs

//! Connected storage sessions and the handles tasks work with.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::storage::{Metadata, Storage, matches_query};

/// A connected store, shared by every node of one invocation.
///
/// The connection is acquired by [`Session::open`] and released when the
/// last clone of the session (including the handles derived from it) is
/// dropped, so every exit path disconnects. A session is bound to one store
/// for its whole lifetime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Connection>,
}

struct Connection {
    storage: Arc<dyn Storage>,
    read_only: bool,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let released = if self.read_only {
            self.storage.disconnect_read_only()
        } else {
            self.storage.disconnect()
        };
        match released {
            Ok(()) => debug!("storage session closed"),
            Err(err) => warn!(error = %err, "failed to disconnect storage session"),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("storage", &self.inner.storage)
            .field("read_only", &self.inner.read_only)
            .finish()
    }
}

impl Session {
    /// Connect to `storage` and return the session guard.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        storage.connect()?;
        debug!("storage session opened");
        Ok(Self {
            inner: Arc::new(Connection {
                storage,
                read_only: false,
            }),
        })
    }

    /// Connect for inspection only, as dry runs do. Callers must not write
    /// through a read-only session.
    pub fn open_read_only(storage: Arc<dyn Storage>) -> Result<Self> {
        storage.connect_read_only()?;
        debug!("read-only storage session opened");
        Ok(Self {
            inner: Arc::new(Connection {
                storage,
                read_only: true,
            }),
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Fetch an existing dataset.
    pub fn dataset(&self, id: &str) -> Result<Option<Dataset>> {
        if self.storage().dataset_exists(id)? {
            Ok(Some(self.dataset_handle(id)))
        } else {
            Ok(None)
        }
    }

    /// Create a dataset (idempotent) and return its handle.
    pub fn create_dataset(&self, id: &str) -> Result<Dataset> {
        self.storage().create_dataset(id)?;
        Ok(self.dataset_handle(id))
    }

    pub fn datasets(&self) -> Result<Vec<Dataset>> {
        Ok(self
            .storage()
            .list_datasets()?
            .iter()
            .map(|id| self.dataset_handle(id))
            .collect())
    }

    fn dataset_handle(&self, id: &str) -> Dataset {
        Dataset {
            session: self.clone(),
            id: id.to_string(),
        }
    }
}

/// Handle to a dataset inside a session.
#[derive(Clone, Debug)]
pub struct Dataset {
    session: Session,
    id: String,
}

impl Dataset {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.session.storage().dataset_path(&self.id)
    }

    pub fn collection(&self, name: &str) -> Result<Option<Collection>> {
        if self.session.storage().collection_exists(&self.id, name)? {
            Ok(Some(self.collection_handle(name)))
        } else {
            Ok(None)
        }
    }

    /// Create a collection (idempotent) and return its handle.
    pub fn create_collection(&self, name: &str) -> Result<Collection> {
        self.session.storage().create_collection(&self.id, name)?;
        Ok(self.collection_handle(name))
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.session.storage().delete_collection(&self.id, name)
    }

    pub fn collections(&self) -> Result<Vec<Collection>> {
        Ok(self
            .session
            .storage()
            .list_collections(&self.id)?
            .iter()
            .map(|name| self.collection_handle(name))
            .collect())
    }

    pub fn read_document(&self, name: &str) -> Result<Option<String>> {
        self.session.storage().read_document(&self.id, name)
    }

    pub fn write_document(&self, name: &str, contents: &str) -> Result<()> {
        self.session.storage().write_document(&self.id, name, contents)
    }

    pub fn delete_document(&self, name: &str) -> Result<bool> {
        self.session.storage().delete_document(&self.id, name)
    }

    pub fn documents(&self) -> Result<Vec<String>> {
        self.session.storage().list_documents(&self.id)
    }

    pub fn prune_metadata(&self) -> Result<Vec<String>> {
        self.session.storage().prune_metadata(&self.id)
    }

    fn collection_handle(&self, name: &str) -> Collection {
        Collection {
            session: self.session.clone(),
            dataset: self.id.clone(),
            name: name.to_string(),
        }
    }
}

/// Handle to a collection inside a dataset.
#[derive(Clone, Debug)]
pub struct Collection {
    session: Session,
    dataset: String,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset
    }

    /// Items whose metadata matches `query` (see [`matches_query`]).
    pub fn items(&self, query: &Metadata) -> Result<Vec<Item>> {
        let storage = self.session.storage();
        let mut items = Vec::new();
        for id in storage.list_items(&self.dataset, &self.name)? {
            if !query.is_empty() {
                let metadata = storage.item_metadata(&self.dataset, &self.name, &id)?;
                if !matches_query(&metadata, query) {
                    continue;
                }
            }
            items.push(self.item_handle(&id));
        }
        Ok(items)
    }

    pub fn item_count(&self) -> Result<usize> {
        Ok(self
            .session
            .storage()
            .list_items(&self.dataset, &self.name)?
            .len())
    }

    pub fn item(&self, id: &str) -> Result<Option<Item>> {
        if self
            .session
            .storage()
            .item_exists(&self.dataset, &self.name, id)?
        {
            Ok(Some(self.item_handle(id)))
        } else {
            Ok(None)
        }
    }

    pub fn create_item(&self, id: &str) -> Result<Item> {
        self.session
            .storage()
            .create_item(&self.dataset, &self.name, id)?;
        Ok(self.item_handle(id))
    }

    pub fn metadata(&self) -> Result<Metadata> {
        self.session
            .storage()
            .collection_metadata(&self.dataset, &self.name)
    }

    pub fn set_metadata(&self, metadata: &Metadata) -> Result<()> {
        self.session
            .storage()
            .set_collection_metadata(&self.dataset, &self.name, metadata)
    }

    pub fn set_metadata_key(&self, key: &str, value: Value) -> Result<()> {
        let mut metadata = Metadata::new();
        metadata.insert(key.to_string(), value);
        self.set_metadata(&metadata)
    }

    fn item_handle(&self, id: &str) -> Item {
        Item {
            session: self.session.clone(),
            dataset: self.dataset.clone(),
            collection: self.name.clone(),
            id: id.to_string(),
        }
    }
}

/// Handle to a single stored item.
#[derive(Clone, Debug)]
pub struct Item {
    session: Session,
    dataset: String,
    collection: String,
    id: String,
}

impl Item {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.session
            .storage()
            .read_item(&self.dataset, &self.collection, &self.id)
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.session
            .storage()
            .write_item(&self.dataset, &self.collection, &self.id, data)
    }

    pub fn metadata(&self) -> Result<Metadata> {
        self.session
            .storage()
            .item_metadata(&self.dataset, &self.collection, &self.id)
    }

    pub fn set_metadata(&self, metadata: &Metadata) -> Result<()> {
        self.session
            .storage()
            .set_item_metadata(&self.dataset, &self.collection, &self.id, metadata)
    }

    pub fn replace_metadata(&self, metadata: &Metadata) -> Result<()> {
        self.session
            .storage()
            .replace_item_metadata(&self.dataset, &self.collection, &self.id, metadata)
    }
}
