// src/engine/batch.rs

//! Running one task request over many datasets.

use futures::stream::{self, StreamExt};
use tracing::{Instrument, error, info, info_span};

use crate::config::model::PipelineConfig;
use crate::errors::{Result, ScandagError};

use super::{Pipeline, RunReport, TaskRequest};

/// Outcome of a batch: successful runs and per-dataset failures, each in
/// the order the datasets were given.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<RunReport>,
    pub failed: Vec<(String, ScandagError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Append another batch's results (e.g. from another store).
    pub fn extend(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    pub fn failed_datasets(&self) -> Vec<&str> {
        self.failed.iter().map(|(id, _)| id.as_str()).collect()
    }
}

impl Pipeline {
    /// Run `request` against each dataset. A failure on one dataset is
    /// logged and recorded; it never stops the others.
    ///
    /// Datasets are processed one at a time unless the explicit
    /// configuration sets `[worker] dataset_concurrency` above one.
    pub async fn execute_batch(&self, request: &TaskRequest, datasets: &[String]) -> BatchReport {
        let concurrency = match PipelineConfig::new(request.config.clone()).worker() {
            Ok(worker) => worker.dataset_concurrency.max(1),
            Err(err) => {
                error!(error = %err, "invalid [worker] section; processing datasets sequentially");
                1
            }
        };
        info!(
            task = %request.task,
            datasets = datasets.len(),
            concurrency,
            "starting batch"
        );

        let mut results: Vec<(usize, String, Result<RunReport>)> = stream::iter(datasets.iter().enumerate())
            .map(|(index, id)| {
                let span = info_span!("dataset", id = %id);
                async move {
                    info!("processing dataset");
                    let result = match self.execute_task(request, id).await {
                        Ok(report) => report.into_result(),
                        Err(err) => Err(err),
                    };
                    (index, id.clone(), result)
                }
                .instrument(span)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport::default();
        for (_, id, result) in results {
            match result {
                Ok(run) => {
                    info!(dataset = %id, elapsed = ?run.elapsed, "dataset done");
                    report.succeeded.push(run);
                }
                Err(err) => {
                    error!(dataset = %id, error = %err, "dataset failed");
                    report.failed.push((id, err));
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        report
    }
}
