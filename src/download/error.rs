//! Error types for the download module.
//!
//! [`DownloadError`] describes why one fetch attempt failed; it is classified
//! by [`classify_error`](super::classify_error) and folded into a
//! [`FetchOutcome`](crate::FetchOutcome) once retries are exhausted.
//! [`OrchestratorError`] covers the batch-level preconditions that fail a
//! whole call before any worker starts.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a single fetch attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The attempt exceeded its time budget.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// File system error during download (create file, write, rename, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or not http(s).
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Downloaded byte count does not match the server's Content-Length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// The batch was cancelled while this attempt was running.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The URL being fetched.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path, which the source errors don't carry.

/// Batch-level precondition failures. Per-item failures never surface here.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The destination directory cannot be created or written to.
    #[error("destination {path} is not writable: {source}")]
    DestinationUnwritable {
        /// The destination directory.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The requested concurrency is outside the supported range.
    #[error("max_concurrency must be between {min} and {max}, got {value}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
        /// Lowest accepted value.
        min: usize,
        /// Highest accepted value.
        max: usize,
    },
}

impl OrchestratorError {
    /// Creates a destination-unwritable error.
    pub fn destination_unwritable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DestinationUnwritable {
            path: path.into(),
            source,
        }
    }
}
