//! Fetch worker: one descriptor in, one [`FetchOutcome`] out.
//!
//! Bytes are streamed into a hidden `.<name>.part` file next to the
//! destination and renamed into place only after the body is complete and
//! its length verified, so the destination path never holds partial data.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::CONNECT_TIMEOUT;
use super::error::DownloadError;
use super::filename::part_path_for;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, parse_retry_after};
use crate::resource::{FailureKind, FetchOutcome, ResourceDescriptor};
use crate::user_agent::default_user_agent;

/// Builds the HTTP client used for file downloads.
///
/// There is no overall request timeout here: each attempt is bounded by
/// [`RetryPolicy::attempt_timeout`] instead.
///
/// # Errors
///
/// Returns the reqwest builder error if the TLS backend cannot be initialised.
pub fn build_download_client(
    user_agent: &str,
    connect_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .gzip(true)
        .user_agent(user_agent)
        .build()
}

/// Retrieves one resource into its resolved path, with bounded retries.
#[derive(Debug, Clone)]
pub struct FetchWorker {
    client: Client,
    policy: RetryPolicy,
}

impl FetchWorker {
    /// Creates a worker around an existing client and retry policy.
    #[must_use]
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Creates a worker with the default user agent and retry policy.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the client cannot be built.
    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        let client = build_download_client(&default_user_agent(), CONNECT_TIMEOUT)?;
        Ok(Self::new(client, RetryPolicy::default()))
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `descriptor` into `path`.
    ///
    /// A non-empty file already at `path` is reported `Skipped` without any
    /// request. Never fails: every error ends up in the returned outcome.
    #[instrument(skip(self, descriptor, cancel), fields(url = %descriptor.resource_url(), path = %path.display()))]
    pub async fn fetch(
        &self,
        descriptor: &ResourceDescriptor,
        path: &Path,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        if is_non_empty_file(path).await {
            info!("destination already present, skipping");
            return FetchOutcome::skipped(descriptor.clone(), path.to_path_buf(), 0);
        }

        let url = descriptor.resource_url();
        if let Err(error) = validate_url(url) {
            return FetchOutcome::failed(
                descriptor.clone(),
                FailureKind::DefinitiveFetchFailure,
                error.to_string(),
                0,
            );
        }

        let mut attempt: u32 = 1;
        loop {
            if cancel.is_cancelled() {
                return FetchOutcome::cancelled(descriptor.clone(), attempt - 1);
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(DownloadError::cancelled(url)),
                timed = tokio::time::timeout(self.policy.attempt_timeout(), self.attempt(url, path)) => {
                    timed.unwrap_or_else(|_| Err(DownloadError::timeout(url)))
                }
            };

            let error = match result {
                Ok(bytes) => {
                    info!(attempt, bytes, "download complete");
                    return FetchOutcome::success(descriptor.clone(), path.to_path_buf(), attempt);
                }
                Err(DownloadError::Cancelled { .. }) => {
                    debug!(attempt, "attempt aborted by cancellation");
                    return FetchOutcome::cancelled(descriptor.clone(), attempt);
                }
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            match self
                .policy
                .should_retry_after(failure_type, attempt, retry_after_hint(&error))
            {
                RetryDecision::Retry { delay, attempt: next } => {
                    warn!(
                        attempt,
                        next_attempt = next,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return FetchOutcome::cancelled(descriptor.clone(), attempt);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    let kind = match failure_type {
                        FailureType::Permanent => FailureKind::DefinitiveFetchFailure,
                        FailureType::Transient | FailureType::RateLimited => {
                            FailureKind::TransientFetchFailure
                        }
                    };
                    warn!(attempt, error = %error, reason = %reason, "download failed");
                    return FetchOutcome::failed(descriptor.clone(), kind, error.to_string(), attempt);
                }
            }
        }
    }

    /// One GET + stream + verify + rename. Dropping the future mid-way removes
    /// the partial file.
    async fn attempt(&self, url: &str, path: &Path) -> Result<u64, DownloadError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let expected = response.content_length();
        let part = PartFile::new(part_path_for(path));
        let mut file = File::create(part.path())
            .await
            .map_err(|e| DownloadError::io(part.path(), e))?;

        let written = stream_to_file(&mut file, response, url, part.path()).await?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::io(part.path(), e))?;
        drop(file);

        check_content_length(path, expected, written)?;

        tokio::fs::rename(part.path(), path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        part.keep();

        Ok(written)
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

fn check_content_length(path: &Path, expected: Option<u64>, actual: u64) -> Result<(), DownloadError> {
    match expected {
        Some(expected) if expected != actual => Err(DownloadError::integrity(path, expected, actual)),
        _ => Ok(()),
    }
}

fn retry_after_hint(error: &DownloadError) -> Option<Duration> {
    match error {
        DownloadError::HttpStatus {
            retry_after: Some(value),
            ..
        } => parse_retry_after(value),
        _ => None,
    }
}

fn validate_url(url: &str) -> Result<Url, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    if matches!(parsed.scheme(), "http" | "https") {
        Ok(parsed)
    } else {
        Err(DownloadError::invalid_url(url))
    }
}

async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

/// Removes the partial file on drop unless [`keep`](Self::keep) was called.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!(path = %self.path.display(), "removed partial file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove partial file"),
            }
        }
    }
}
