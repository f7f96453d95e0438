#![allow(dead_code)]

use std::sync::Arc;

use scandag::engine::Pipeline;
use scandag::storage::{MemoryStorage, Storage};
use scandag_test_utils::builders::Fixtures;

pub use scandag_test_utils::init_tracing;

/// A pipeline over a fresh in-memory store, plus a handle on the store for
/// assertions.
pub fn memory_pipeline(fixtures: &Fixtures) -> (MemoryStorage, Pipeline) {
    init_tracing();
    let storage = MemoryStorage::new();
    let pipeline = Pipeline::new(fixtures.registry(), Arc::new(storage.clone()));
    (storage, pipeline)
}

pub fn shared(storage: &MemoryStorage) -> Arc<dyn Storage> {
    Arc::new(storage.clone())
}
