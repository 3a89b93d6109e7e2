//! Download subsystem: path resolution, fetch workers, and batch orchestration.
//!
//! # Features
//!
//! - Deterministic, collision-free destination paths ([`PathResolver`])
//! - Streaming downloads into a temp file, renamed into place on success
//! - Bounded retries with exponential backoff and jitter ([`RetryPolicy`])
//! - Bounded concurrency and partial-failure semantics per batch
//! - Cooperative cancellation through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!
//! # Example
//!
//! ```no_run
//! use paperfetch_core::download::{BatchOptions, DownloadOrchestrator, FetchWorker};
//! use paperfetch_core::ResourceDescriptor;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = DownloadOrchestrator::new(FetchWorker::with_defaults()?);
//! let batch = vec![ResourceDescriptor::new(
//!     "link-list",
//!     "https://example.com/papers",
//!     "https://example.com/papers/0580_s23_qp_12.pdf",
//!     "0580_s23_qp_12.pdf",
//! )];
//! let report = orchestrator
//!     .download_batch(&batch, Path::new("./papers"), BatchOptions::default(), &CancellationToken::new())
//!     .await?;
//! println!("{} ok, {} failed", report.succeeded(), report.failed());
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod error;
mod filename;
mod orchestrator;
mod retry;
mod worker;

pub use constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use error::{DownloadError, OrchestratorError};
pub use filename::{
    FALLBACK_FILENAME, MAX_FILENAME_BYTES, PathLayout, PathResolver, ResolvedPath,
    filename_for, filename_from_url,
};
pub use orchestrator::{BatchOptions, DownloadOrchestrator};
pub use retry::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_ATTEMPTS, FailureType, MAX_RETRY_AFTER, RetryDecision,
    RetryPolicy, classify_error, parse_retry_after,
};
pub use worker::{FetchWorker, build_download_client};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
