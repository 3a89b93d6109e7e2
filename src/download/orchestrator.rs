//! Batch orchestration: resolve paths up front, fan out fetch workers under a
//! concurrency bound, and collect one outcome per descriptor in input order.
//!
//! # Concurrency Model
//!
//! - A semaphore permit is acquired before each worker task is spawned
//! - Permits are released automatically when the task finishes (RAII)
//! - Completion order is unconstrained; the report is rebuilt by index
//!
//! # Failure Model
//!
//! Per-item failures never abort siblings. Only structural preconditions
//! (an unwritable destination, an out-of-range concurrency) fail the call,
//! and they are checked before any worker starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::error::OrchestratorError;
use super::filename::{PathLayout, PathResolver, ResolvedPath};
use super::worker::FetchWorker;
use crate::resource::{BatchReport, FailureKind, FetchOutcome, ResourceDescriptor};

static PROBE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-call batch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchOptions {
    /// Maximum number of fetches in flight at once.
    pub max_concurrency: usize,
    /// Directory layout under the destination.
    pub layout: PathLayout,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            layout: PathLayout::Flat,
        }
    }
}

/// Schedules fetch workers for a batch and aggregates their outcomes.
#[derive(Debug, Clone)]
pub struct DownloadOrchestrator {
    worker: Arc<FetchWorker>,
}

impl DownloadOrchestrator {
    /// Creates an orchestrator that runs `worker` for every item.
    #[must_use]
    pub fn new(worker: FetchWorker) -> Self {
        Self {
            worker: Arc::new(worker),
        }
    }

    /// Downloads every descriptor into `dest_dir`.
    ///
    /// Returns one outcome per input descriptor, in input order. An empty
    /// batch returns an empty report without touching the filesystem.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::InvalidConcurrency`] if `max_concurrency` is
    ///   outside `1..=32`
    /// - [`OrchestratorError::DestinationUnwritable`] if `dest_dir` cannot be
    ///   created or written to
    #[instrument(skip(self, descriptors, options, cancel), fields(items = descriptors.len(), dest = %dest_dir.display()))]
    pub async fn download_batch(
        &self,
        descriptors: &[ResourceDescriptor],
        dest_dir: &Path,
        options: BatchOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, OrchestratorError> {
        validate_concurrency(options.max_concurrency)?;

        if descriptors.is_empty() {
            debug!("empty batch, nothing to do");
            return Ok(BatchReport::default());
        }

        let dest_dir = prepare_destination(dest_dir).await?;
        let resolved = PathResolver::new(&dest_dir, options.layout).resolve_batch(descriptors);

        let semaphore = Arc::new(Semaphore::new(options.max_concurrency));
        let mut slots: Vec<Option<FetchOutcome>> = vec![None; descriptors.len()];
        let mut handles: Vec<(usize, JoinHandle<FetchOutcome>)> = Vec::new();

        for (index, (descriptor, resolved_path)) in descriptors.iter().zip(&resolved).enumerate() {
            let ResolvedPath::Claimed(path) = resolved_path else {
                continue;
            };

            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                debug!(index, "batch cancelled before item started");
                slots[index] = Some(FetchOutcome::cancelled(descriptor.clone(), 0));
                continue;
            };

            let worker = Arc::clone(&self.worker);
            let descriptor = descriptor.clone();
            let path = path.clone();
            let cancel = cancel.clone();
            handles.push((
                index,
                tokio::spawn(async move {
                    let _permit = permit;
                    worker.fetch(&descriptor, &path, &cancel).await
                }),
            ));
        }

        for (index, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    warn!(index, error = %join_error, "fetch task failed");
                    FetchOutcome::failed(
                        descriptors[index].clone(),
                        FailureKind::DefinitiveFetchFailure,
                        format!("fetch task failed: {join_error}"),
                        0,
                    )
                }
            };
            slots[index] = Some(outcome);
        }

        let outcomes = collect_outcomes(descriptors, &resolved, &slots);
        let report = BatchReport::from_outcomes(outcomes);
        info!(
            total = report.total(),
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            "batch complete"
        );
        Ok(report)
    }
}

/// Rebuilds input order; duplicates copy their primary's outcome.
fn collect_outcomes(
    descriptors: &[ResourceDescriptor],
    resolved: &[ResolvedPath],
    slots: &[Option<FetchOutcome>],
) -> Vec<FetchOutcome> {
    descriptors
        .iter()
        .zip(resolved)
        .enumerate()
        .map(|(index, (descriptor, resolved_path))| {
            let recorded = match resolved_path {
                ResolvedPath::Claimed(_) => slots[index].clone(),
                ResolvedPath::DuplicateOf(primary) => slots[*primary]
                    .as_ref()
                    .map(|outcome| outcome.for_duplicate(descriptor.clone())),
            };
            recorded.unwrap_or_else(|| {
                FetchOutcome::failed(
                    descriptor.clone(),
                    FailureKind::DefinitiveFetchFailure,
                    "no outcome recorded for item",
                    0,
                )
            })
        })
        .collect()
}

fn validate_concurrency(value: usize) -> Result<(), OrchestratorError> {
    if (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&value) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidConcurrency {
            value,
            min: MIN_CONCURRENCY,
            max: MAX_CONCURRENCY,
        })
    }
}

/// Makes `dest_dir` absolute, creates it, and proves it is writable.
async fn prepare_destination(dest_dir: &Path) -> Result<PathBuf, OrchestratorError> {
    let absolute = std::path::absolute(dest_dir)
        .map_err(|e| OrchestratorError::destination_unwritable(dest_dir, e))?;

    tokio::fs::create_dir_all(&absolute)
        .await
        .map_err(|e| OrchestratorError::destination_unwritable(&absolute, e))?;

    let probe = absolute.join(format!(
        ".paperfetch-probe-{}-{}",
        std::process::id(),
        PROBE_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    tokio::fs::write(&probe, b"")
        .await
        .map_err(|e| OrchestratorError::destination_unwritable(&absolute, e))?;
    if let Err(e) = tokio::fs::remove_file(&probe).await {
        warn!(path = %probe.display(), error = %e, "failed to remove write probe");
    }

    Ok(absolute)
}
