//! Task registries and dataset contents used across the integration tests.
//!
//! The fixture registry wires a small family of producers on top of the
//! built-in tasks:
//!
//! ```text
//! Acquire (source) ── Segment {channel: rgb} ── Reconstruct
//!        ├── Left ──┐
//!        ├── Right ─┴── Merge
//!        └── Broken ── AfterBroken
//! ImagesCollectionExists ── Undistort
//!                       └── Threshold {level}
//! VirtualPlantObj ── Render
//! Flaky
//! ```
//!
//! Every fixture task appends its family name to a shared [`ExecutionLog`]
//! when its `run()` is entered.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use scandag::errors::Result;
use scandag::storage::{Collection, IMAGES_COLLECTION, Item, Metadata, Session, Storage};
use scandag::task::{
    FileByFile, ParamSpec, ParamType, ParamValue, TaskContext, TaskLogic, TaskRegistry, TaskSpec,
};
use serde_json::{Value, json};

/// Module the fixture tasks are registered in, except `Acquire`.
pub const FIXTURE_MODULE: &str = "fixtures";

/// Module of the `Acquire` source task.
pub const ACQUISITION_MODULE: &str = "acquisition";

/// Number of items `Acquire` writes; half of them are `rgb`.
pub const ACQUIRED_ITEMS: usize = 4;

/// Families of executed tasks, in the order their `run()` was entered.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// Wraps task logic so every run is recorded before it starts.
pub struct Recorded<L> {
    log: ExecutionLog,
    inner: L,
}

impl<L: TaskLogic> Recorded<L> {
    pub fn new(log: &ExecutionLog, inner: L) -> Self {
        Self {
            log: Arc::clone(log),
            inner,
        }
    }
}

impl<L: TaskLogic> TaskLogic for Recorded<L> {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(ctx.node().family().to_string());
        self.inner.run(ctx)
    }
}

/// Fails (after writing a partial item) while `failures` is above zero,
/// decrementing it on every failed attempt.
pub struct FlakyTask {
    failures: Arc<AtomicUsize>,
}

impl TaskLogic for FlakyTask {
    fn run(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        let output = ctx.output()?;
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            output.create_item("partial")?;
            bail!("flaky failure ({left} left)");
        }
        let item = output.create_item("result")?;
        item.write(b"settled")?;
        Ok(())
    }
}

/// Shared state of one test's fixture tasks.
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    pub log: ExecutionLog,
    /// Attempts `Flaky` fails before it succeeds.
    pub flaky_failures: Arc<AtomicUsize>,
}

impl Fixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flaky_failures(self, failures: usize) -> Self {
        self.flaky_failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Snapshot of the execution log.
    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Built-in tasks plus the fixture tasks, all recording into `self.log`.
    pub fn registry(&self) -> TaskRegistry {
        let log = &self.log;
        let mut registry = TaskRegistry::builtin();

        registry
            .register(
                TaskSpec::producer(
                    "Acquire",
                    ACQUISITION_MODULE,
                    Arc::new(Recorded::new(log, acquire)),
                )
                .source(),
            )
            .register(
                TaskSpec::producer(
                    "Segment",
                    FIXTURE_MODULE,
                    Arc::new(Recorded::new(log, FileByFile::new(segment_item))),
                )
                .param(ParamSpec::task("upstream_task", "Acquire"))
                .param(ParamSpec::dict("query", channel_query("rgb"))),
            )
            .register(
                TaskSpec::producer(
                    "Reconstruct",
                    FIXTURE_MODULE,
                    Arc::new(Recorded::new(log, reconstruct)),
                )
                .param(ParamSpec::task("upstream_task", "Segment")),
            )
            .register(upstream_of_acquire(log, "Left"))
            .register(upstream_of_acquire(log, "Right"))
            .register(
                TaskSpec::producer("Merge", FIXTURE_MODULE, Arc::new(Recorded::new(log, merge)))
                    .param(ParamSpec::task("left_task", "Left"))
                    .param(ParamSpec::task("right_task", "Right")),
            )
            .register(
                TaskSpec::producer("Broken", FIXTURE_MODULE, Arc::new(Recorded::new(log, broken)))
                    .param(ParamSpec::task("upstream_task", "Acquire")),
            )
            .register(
                TaskSpec::producer(
                    "AfterBroken",
                    FIXTURE_MODULE,
                    Arc::new(Recorded::new(log, single_item)),
                )
                .param(ParamSpec::task("upstream_task", "Broken")),
            )
            .register(
                TaskSpec::producer(
                    "Undistort",
                    FIXTURE_MODULE,
                    Arc::new(Recorded::new(log, FileByFile::new(undistort_item))),
                )
                .param(ParamSpec::task("upstream_task", "ImagesCollectionExists"))
                .param(ParamSpec::dict("query", BTreeMap::new())),
            )
            .register(
                TaskSpec::producer(
                    "Threshold",
                    FIXTURE_MODULE,
                    Arc::new(Recorded::new(log, threshold)),
                )
                .param(ParamSpec::task("upstream_task", "ImagesCollectionExists"))
                .param(ParamSpec::int("level", 1))
                .param(ParamSpec::string("label", "default").insignificant()),
            )
            .register(
                TaskSpec::producer("Render", FIXTURE_MODULE, Arc::new(Recorded::new(log, render)))
                    .param(ParamSpec::task("upstream_task", "VirtualPlantObj")),
            )
            .register(TaskSpec::producer(
                "Flaky",
                FIXTURE_MODULE,
                Arc::new(Recorded::new(
                    log,
                    FlakyTask {
                        failures: Arc::clone(&self.flaky_failures),
                    },
                )),
            ));

        registry.register_library("fixtures", "0.0.1");
        registry
    }
}

/// Two producers referencing each other through their default upstreams.
pub fn cyclic_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::builtin();
    registry
        .register(
            TaskSpec::producer("CycleA", FIXTURE_MODULE, Arc::new(single_item))
                .param(ParamSpec::task("upstream_task", "CycleB")),
        )
        .register(
            TaskSpec::producer("CycleB", FIXTURE_MODULE, Arc::new(single_item))
                .param(ParamSpec::task("upstream_task", "CycleA")),
        );
    registry
}

/// A task with one required string parameter, for schema error tests.
pub fn strict_registry() -> TaskRegistry {
    let mut registry = TaskRegistry::builtin();
    registry.register(
        TaskSpec::producer("Strict", FIXTURE_MODULE, Arc::new(single_item))
            .param(ParamSpec::required("mode", ParamType::Str))
            .param(ParamSpec::float("scale", 1.0)),
    );
    registry
}

fn upstream_of_acquire(log: &ExecutionLog, name: &str) -> TaskSpec {
    TaskSpec::producer(name, FIXTURE_MODULE, Arc::new(Recorded::new(log, single_item)))
        .param(ParamSpec::task("upstream_task", "Acquire"))
}

fn channel_query(channel: &str) -> BTreeMap<String, ParamValue> {
    BTreeMap::from([("channel".to_string(), ParamValue::Str(channel.to_string()))])
}

fn acquire(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let output = ctx.output()?;
    for i in 0..ACQUIRED_ITEMS {
        let channel = if i % 2 == 0 { "rgb" } else { "mask" };
        let item = output.create_item(&format!("shot_{i:03}"))?;
        item.write(format!("{channel}:{i}").as_bytes())?;
        item.set_metadata(&metadata(&[
            ("channel", json!(channel)),
            ("shot_id", json!(i)),
        ]))?;
    }
    Ok(())
}

fn segment_item(input: &Item, output: &Collection) -> anyhow::Result<Option<Item>> {
    let item = output.create_item(input.id())?;
    item.write(&input.read()?)?;
    item.set_metadata(&metadata(&[("segmented", json!(true))]))?;
    Ok(Some(item))
}

fn undistort_item(input: &Item, output: &Collection) -> anyhow::Result<Option<Item>> {
    let item = output.create_item(input.id())?;
    item.write(&input.read()?)?;
    item.set_metadata(&metadata(&[("undistorted", json!(true))]))?;
    Ok(Some(item))
}

fn reconstruct(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let inputs = ctx.input(0)?.item_count()?;
    if inputs == 0 {
        bail!("nothing to reconstruct");
    }
    let item = ctx.output()?.create_item("model")?;
    item.write(b"mesh")?;
    item.set_metadata(&metadata(&[("inputs", json!(inputs))]))?;
    Ok(())
}

fn merge(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let total: usize = ctx
        .inputs()?
        .iter()
        .map(|c| c.item_count())
        .sum::<Result<usize>>()?;
    let item = ctx.output()?.create_item("merged")?;
    item.set_metadata(&metadata(&[("inputs", json!(total))]))?;
    Ok(())
}

fn threshold(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let level = ctx.params().get("level").and_then(ParamValue::as_int);
    let item = ctx.output()?.create_item("result")?;
    item.set_metadata(&metadata(&[("level", json!(level))]))?;
    Ok(())
}

fn render(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let model = ctx.input(0)?;
    let item = ctx.output()?.create_item("render")?;
    item.set_metadata(&metadata(&[("model", json!(model.name()))]))?;
    Ok(())
}

fn broken(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    ctx.output()?.create_item("partial")?.write(b"half")?;
    bail!("broken on purpose");
}

fn single_item(ctx: &TaskContext<'_>) -> anyhow::Result<()> {
    let item = ctx.output()?.create_item(ctx.node().family())?;
    item.write(b"ok")?;
    Ok(())
}

/// Build a metadata map from literal pairs.
pub fn metadata(pairs: &[(&str, Value)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Parse a TOML literal into a configuration table.
pub fn config(text: &str) -> toml::Table {
    toml::from_str(text).expect("fixture configuration must be valid TOML")
}

/// Create an empty dataset.
pub fn new_dataset(storage: Arc<dyn Storage>, dataset: &str) -> Result<()> {
    let session = Session::open(storage)?;
    session.create_dataset(dataset)?;
    Ok(())
}

/// Create `dataset` with an `images` collection of `count` items.
///
/// Even items are `rgb`, odd ones `mask`. Every item carries the usual
/// acquisition metadata plus an `exposure` key that cleanup does not
/// protect.
pub fn seed_images(storage: Arc<dyn Storage>, dataset: &str, count: usize) -> Result<()> {
    let session = Session::open(storage)?;
    let images = session
        .create_dataset(dataset)?
        .create_collection(IMAGES_COLLECTION)?;
    for i in 0..count {
        let channel = if i % 2 == 0 { "rgb" } else { "mask" };
        let item = images.create_item(&format!("img_{i:03}"))?;
        item.write(format!("pixels {i}").as_bytes())?;
        item.set_metadata(&metadata(&[
            ("channel", json!(channel)),
            ("pose", json!([i, 0, 0])),
            ("camera", json!("cam0")),
            ("shot_id", json!(i)),
            ("exposure", json!(0.5)),
        ]))?;
    }
    Ok(())
}

/// Add a populated collection `name` to an existing dataset.
pub fn seed_collection(
    storage: Arc<dyn Storage>,
    dataset: &str,
    name: &str,
    count: usize,
) -> Result<()> {
    let session = Session::open(storage)?;
    let Some(dataset) = session.dataset(dataset)? else {
        return Err(scandag::errors::ScandagError::Storage(format!(
            "no dataset '{dataset}' to seed"
        )));
    };
    let collection = dataset.create_collection(name)?;
    for i in 0..count {
        collection.create_item(&format!("{name}_{i}"))?.write(b"derived")?;
    }
    Ok(())
}
