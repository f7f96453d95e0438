// src/storage/fsdb.rs

//! Filesystem-backed [`Storage`].
//!
//! Layout below the database root:
//!
//! ```text
//! <root>/lock                                  held while connected
//! <root>/<dataset>/                            one directory per dataset
//! <root>/<dataset>/<document>                  records, local overrides
//! <root>/<dataset>/<collection>/<item>         item payloads
//! <root>/<dataset>/metadata/<collection>.json  collection metadata
//! <root>/<dataset>/metadata/<collection>/<item>.json
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing::{debug, info, warn};

use super::{Metadata, Storage, validate_id};
use crate::errors::{Result, ScandagError};

/// Name of the per-dataset directory holding metadata documents.
pub const METADATA_DIR: &str = "metadata";

/// Name of the lock file created in the database root while connected.
pub const LOCK_FILE: &str = "lock";

/// Database stored as plain directories and files.
///
/// Connections are reference counted inside one process: the lock file is
/// created by the first `connect` and removed by the last `disconnect`. A
/// lock file left by another process makes `connect` fail with
/// `StorageBusy`.
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    connections: Mutex<usize>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connections: Mutex::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset)
    }

    fn collection_dir(&self, dataset: &str, collection: &str) -> PathBuf {
        self.dataset_dir(dataset).join(collection)
    }

    fn item_path(&self, dataset: &str, collection: &str, item: &str) -> PathBuf {
        self.collection_dir(dataset, collection).join(item)
    }

    fn metadata_dir(&self, dataset: &str) -> PathBuf {
        self.dataset_dir(dataset).join(METADATA_DIR)
    }

    fn collection_metadata_path(&self, dataset: &str, collection: &str) -> PathBuf {
        self.metadata_dir(dataset).join(format!("{collection}.json"))
    }

    fn item_metadata_path(&self, dataset: &str, collection: &str, item: &str) -> PathBuf {
        self.metadata_dir(dataset)
            .join(collection)
            .join(format!("{item}.json"))
    }

    fn require_dataset(&self, dataset: &str) -> Result<PathBuf> {
        let dir = self.dataset_dir(dataset);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ScandagError::Storage(format!(
                "dataset '{dataset}' does not exist in {:?}",
                self.root
            )))
        }
    }

    fn require_collection(&self, dataset: &str, collection: &str) -> Result<PathBuf> {
        let dir = self.collection_dir(dataset, collection);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ScandagError::Storage(format!(
                "collection '{dataset}/{collection}' does not exist"
            )))
        }
    }

    fn require_item(&self, dataset: &str, collection: &str, item: &str) -> Result<PathBuf> {
        let path = self.item_path(dataset, collection, item);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ScandagError::Storage(format!(
                "item '{dataset}/{collection}/{item}' does not exist"
            )))
        }
    }

    fn connection_count(&self) -> Result<std::sync::MutexGuard<'_, usize>> {
        self.connections
            .lock()
            .map_err(|_| ScandagError::Storage("connection counter poisoned".to_string()))
    }
}

/// Split a dataset path (`<db-root>/<dataset-id>`) into root and id.
pub fn split_dataset_path(path: &Path) -> Result<(PathBuf, String)> {
    let id = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ScandagError::ConfigError(format!("invalid dataset path {:?}", path)))?;
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((root, id.to_string()))
}

fn list_dir(path: &Path, want_dirs: bool) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_dir() == want_dirs {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn read_metadata(path: &Path) -> Result<Metadata> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Metadata::new()),
        Err(err) => Err(err.into()),
    }
}

fn write_metadata(path: &Path, metadata: &Metadata) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
    }
    let contents = serde_json::to_string_pretty(metadata)?;
    fs::write(path, contents).with_context(|| format!("writing metadata {:?}", path))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match res {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(anyhow::Error::new(err)
            .context(format!("removing {:?}", path))
            .into()),
    }
}

impl Storage for FsStorage {
    fn connect(&self) -> Result<()> {
        let mut count = self.connection_count()?;
        if *count == 0 {
            if !self.root.is_dir() {
                return Err(ScandagError::Storage(format!(
                    "database root {:?} is not a directory",
                    self.root
                )));
            }
            let lock = self.root.join(LOCK_FILE);
            match fs::OpenOptions::new().write(true).create_new(true).open(&lock) {
                Ok(_) => debug!(?lock, "acquired database lock"),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    return Err(ScandagError::StorageBusy(format!(
                        "database {:?} is locked by another process",
                        self.root
                    )));
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("creating lock file {:?}", lock))
                        .into());
                }
            }
        }
        *count += 1;
        Ok(())
    }

    fn connect_read_only(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(ScandagError::Storage(format!(
                "database root {:?} is not a directory",
                self.root
            )));
        }
        if *self.connection_count()? == 0 && self.root.join(LOCK_FILE).exists() {
            warn!(root = ?self.root, "database is locked by another process; reading anyway");
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut count = self.connection_count()?;
        if *count == 0 {
            return Ok(());
        }
        *count -= 1;
        if *count == 0 {
            remove_if_present(&self.root.join(LOCK_FILE))?;
            debug!(root = ?self.root, "released database lock");
        }
        Ok(())
    }

    fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.dataset_dir(dataset).is_dir())
    }

    fn create_dataset(&self, dataset: &str) -> Result<()> {
        validate_id("dataset", dataset)?;
        let dir = self.dataset_dir(dataset);
        if !dir.is_dir() {
            fs::create_dir_all(&dir).with_context(|| format!("creating dataset {:?}", dir))?;
            info!(dataset, "created dataset directory");
        }
        Ok(())
    }

    fn list_datasets(&self) -> Result<Vec<String>> {
        list_dir(&self.root, true)
    }

    fn dataset_path(&self, dataset: &str) -> Option<PathBuf> {
        Some(self.dataset_dir(dataset))
    }

    fn list_collections(&self, dataset: &str) -> Result<Vec<String>> {
        let dir = self.require_dataset(dataset)?;
        Ok(list_dir(&dir, true)?
            .into_iter()
            .filter(|name| name != METADATA_DIR)
            .collect())
    }

    fn collection_exists(&self, dataset: &str, collection: &str) -> Result<bool> {
        Ok(collection != METADATA_DIR && self.collection_dir(dataset, collection).is_dir())
    }

    fn create_collection(&self, dataset: &str, collection: &str) -> Result<()> {
        validate_id("collection", collection)?;
        self.require_dataset(dataset)?;
        let dir = self.collection_dir(dataset, collection);
        fs::create_dir_all(&dir).with_context(|| format!("creating collection {:?}", dir))?;
        Ok(())
    }

    fn delete_collection(&self, dataset: &str, collection: &str) -> Result<()> {
        validate_id("collection", collection)?;
        remove_if_present(&self.collection_dir(dataset, collection))?;
        remove_if_present(&self.collection_metadata_path(dataset, collection))?;
        remove_if_present(&self.metadata_dir(dataset).join(collection))?;
        Ok(())
    }

    fn collection_metadata(&self, dataset: &str, collection: &str) -> Result<Metadata> {
        self.require_collection(dataset, collection)?;
        read_metadata(&self.collection_metadata_path(dataset, collection))
    }

    fn set_collection_metadata(
        &self,
        dataset: &str,
        collection: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.require_collection(dataset, collection)?;
        let path = self.collection_metadata_path(dataset, collection);
        let mut current = read_metadata(&path)?;
        current.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        write_metadata(&path, &current)
    }

    fn list_items(&self, dataset: &str, collection: &str) -> Result<Vec<String>> {
        let dir = self.require_collection(dataset, collection)?;
        list_dir(&dir, false)
    }

    fn item_exists(&self, dataset: &str, collection: &str, item: &str) -> Result<bool> {
        Ok(self.item_path(dataset, collection, item).is_file())
    }

    fn create_item(&self, dataset: &str, collection: &str, item: &str) -> Result<()> {
        validate_id("item", item)?;
        self.require_collection(dataset, collection)?;
        let path = self.item_path(dataset, collection, item);
        if !path.is_file() {
            fs::write(&path, b"").with_context(|| format!("creating item {:?}", path))?;
        }
        Ok(())
    }

    fn read_item(&self, dataset: &str, collection: &str, item: &str) -> Result<Vec<u8>> {
        let path = self.require_item(dataset, collection, item)?;
        Ok(fs::read(&path).with_context(|| format!("reading item {:?}", path))?)
    }

    fn write_item(&self, dataset: &str, collection: &str, item: &str, data: &[u8]) -> Result<()> {
        let path = self.require_item(dataset, collection, item)?;
        fs::write(&path, data).with_context(|| format!("writing item {:?}", path))?;
        Ok(())
    }

    fn item_metadata(&self, dataset: &str, collection: &str, item: &str) -> Result<Metadata> {
        self.require_item(dataset, collection, item)?;
        read_metadata(&self.item_metadata_path(dataset, collection, item))
    }

    fn set_item_metadata(
        &self,
        dataset: &str,
        collection: &str,
        item: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.require_item(dataset, collection, item)?;
        let path = self.item_metadata_path(dataset, collection, item);
        let mut current = read_metadata(&path)?;
        current.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        write_metadata(&path, &current)
    }

    fn replace_item_metadata(
        &self,
        dataset: &str,
        collection: &str,
        item: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.require_item(dataset, collection, item)?;
        write_metadata(&self.item_metadata_path(dataset, collection, item), metadata)
    }

    fn read_document(&self, dataset: &str, name: &str) -> Result<Option<String>> {
        let path = self.require_dataset(dataset)?.join(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("reading document {:?}", path))
                .into()),
        }
    }

    fn write_document(&self, dataset: &str, name: &str, contents: &str) -> Result<()> {
        validate_id("document", name)?;
        let path = self.require_dataset(dataset)?.join(name);
        fs::write(&path, contents).with_context(|| format!("writing document {:?}", path))?;
        Ok(())
    }

    fn delete_document(&self, dataset: &str, name: &str) -> Result<bool> {
        let path = self.require_dataset(dataset)?.join(name);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("deleting document {:?}", path))?;
        Ok(true)
    }

    fn list_documents(&self, dataset: &str) -> Result<Vec<String>> {
        let dir = self.require_dataset(dataset)?;
        list_dir(&dir, false)
    }

    fn prune_metadata(&self, dataset: &str) -> Result<Vec<String>> {
        let dir = self.metadata_dir(dataset);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut pruned = Vec::new();
        for name in list_dir(&dir, false)? {
            if let Some(collection) = name.strip_suffix(".json") {
                if !self.collection_exists(dataset, collection)? {
                    remove_if_present(&dir.join(&name))?;
                    pruned.push(name);
                }
            }
        }
        for name in list_dir(&dir, true)? {
            if !self.collection_exists(dataset, &name)? {
                remove_if_present(&dir.join(&name))?;
                pruned.push(name);
            }
        }
        Ok(pruned)
    }
}
