// src/watch/watcher.rs

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{CreateKind, EventKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::{Pipeline, RunReport, TaskRequest};
use crate::errors::{Result, ScandagError};

/// Wait between attempts while the store reports itself busy.
pub const BUSY_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive; dropping the handle
/// stops watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Dataset id for a created path, if it is a directory directly below
/// `root`.
fn new_dataset_id(root: &Path, event: &Event, path: &Path) -> Option<String> {
    if !matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder | CreateKind::Any)
    ) {
        return None;
    }
    if path.parent()? != root || !path.is_dir() {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    (!name.starts_with('.')).then(|| name.to_string())
}

/// Spawn a watcher on `root` (non-recursive) that sends the id of every
/// newly created dataset directory through `tx`.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    tx: mpsc::UnboundedSender<String>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    let callback_root = root.clone();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in &event.paths {
                    if let Some(id) = new_dataset_id(&callback_root, &event, path) {
                        if let Err(err) = tx.send(id) {
                            eprintln!("scandag: failed to forward new dataset: {err}");
                        }
                    }
                }
            }
            Err(err) => eprintln!("scandag: watch error: {err}"),
        },
        Config::default(),
    )
    .map_err(|err| ScandagError::Other(err.into()))?;

    watcher
        .watch(&root, RecursiveMode::NonRecursive)
        .map_err(|err| ScandagError::Other(err.into()))?;
    info!(root = %root.display(), "watching for new datasets");

    Ok(WatcherHandle { _inner: watcher })
}

/// Run `request` on `dataset`, waiting `backoff` and trying again for as
/// long as the store reports itself busy.
pub async fn run_when_free(
    pipeline: &Pipeline,
    request: &TaskRequest,
    dataset: &str,
    backoff: Duration,
) -> Result<RunReport> {
    let mut attempt = 1u64;
    loop {
        match pipeline.execute_task(request, dataset).await {
            Err(err) if err.is_busy() => {
                warn!(dataset = %dataset, attempt, error = %err, "store busy; retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Reactive mode: run `request` on every dataset created below `root` until
/// `shutdown` resolves.
pub async fn watch_datasets<S>(
    pipeline: &Pipeline,
    request: &TaskRequest,
    root: &Path,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = spawn_watcher(root, tx)?;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            maybe_id = rx.recv() => {
                let Some(id) = maybe_id else {
                    debug!("watch channel closed");
                    break;
                };
                info!(dataset = %id, "new dataset detected");
                match run_when_free(pipeline, request, &id, BUSY_RETRY_INTERVAL)
                    .await
                    .and_then(RunReport::into_result)
                {
                    Ok(report) => info!(dataset = %id, elapsed = ?report.elapsed, "dataset processed"),
                    Err(err) => error!(dataset = %id, error = %err, "dataset processing failed"),
                }
            }
            _ = &mut shutdown => {
                info!("shutdown requested; stopping watcher");
                break;
            }
        }
    }
    Ok(())
}
