// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::errors::{Result, ScandagError};
use crate::storage::Dataset;
use crate::types::{PIPELINE_RECORD, SOURCE_RECORD};

/// Record files are never read as configuration input.
fn is_record(name: &str) -> bool {
    name == SOURCE_RECORD || name == PIPELINE_RECORD
}

/// Parse one TOML document into a table.
pub fn parse_document(origin: &str, contents: &str) -> Result<toml::Table> {
    toml::from_str(contents).map_err(|err| {
        ScandagError::ConfigError(format!("failed to parse '{origin}': {err}"))
    })
}

/// Load configuration from a `.toml` file or from a directory of them.
///
/// A directory contributes every `*.toml` file except the backup records,
/// merged in lexical file-name order.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<toml::Table> {
    let path = path.as_ref();
    if path.is_dir() {
        load_directory(path)
    } else if path.is_file() {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            return Err(ScandagError::ConfigError(format!(
                "configuration file '{}' is not a .toml file",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        parse_document(&path.display().to_string(), &contents)
    } else {
        Err(ScandagError::ConfigError(format!(
            "configuration path '{}' does not exist",
            path.display()
        )))
    }
}

fn load_directory(dir: &Path) -> Result<toml::Table> {
    let pattern = format!("{}/*.toml", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob(&pattern)
        .map_err(|err| ScandagError::ConfigError(format!("bad config directory: {err}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let file = entry.map_err(|err| ScandagError::IoError(err.into_error()))?;
        let keep = file
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| !is_record(name));
        if keep && file.is_file() {
            files.push(file);
        }
    }
    files.sort();

    let mut merged = toml::Table::new();
    for file in &files {
        debug!(file = %file.display(), "loading configuration file");
        let contents = fs::read_to_string(file)?;
        merge_tables(&mut merged, &parse_document(&file.display().to_string(), &contents)?);
    }
    info!(count = files.len(), dir = %dir.display(), "loaded configuration directory");
    Ok(merged)
}

/// Merge every local override document stored alongside the dataset.
pub fn local_overrides(dataset: &Dataset) -> Result<toml::Table> {
    let mut names: Vec<String> = dataset
        .documents()?
        .into_iter()
        .filter(|name| name.ends_with(".toml") && !is_record(name))
        .collect();
    names.sort();

    let mut merged = toml::Table::new();
    for name in &names {
        if let Some(contents) = dataset.read_document(name)? {
            merge_tables(&mut merged, &parse_document(name, &contents)?);
        }
    }
    if !names.is_empty() {
        info!(
            dataset = %dataset.id(),
            files = ?names,
            sections = ?merged.keys().collect::<Vec<_>>(),
            "found local configuration overrides"
        );
    }
    Ok(merged)
}

/// Deep-merge `overlay` into `base`: nested tables merge key by key, any
/// other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: &toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
