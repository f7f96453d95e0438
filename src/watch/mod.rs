// src/watch/mod.rs

//! Reactive mode: watch a database root and process new datasets.

pub mod watcher;

pub use watcher::{BUSY_RETRY_INTERVAL, WatcherHandle, run_when_free, spawn_watcher, watch_datasets};
